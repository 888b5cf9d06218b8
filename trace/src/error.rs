use std::io;
use thiserror::Error;

use crate::record::RECORD_SIZE;

/// An error decoding or encoding a single record.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("malformed record: got {len} bytes, expected {}", RECORD_SIZE)]
    MalformedRecord { len: usize },
    #[error("unknown function tag {0}")]
    UnknownFunctionTag(u8),
    #[error("unknown function name {0:?}")]
    UnknownFunctionName(String),
    #[error(transparent)]
    Layout(#[from] scroll::Error),
}

/// An error while reading a record stream.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("invalid record at offset {offset}")]
    Record {
        offset: u64,
        #[source]
        source: RecordError,
    },
    #[error("failed to read trace")]
    Io(#[from] io::Error),
}

impl ReadError {
    /// Whether the stream can continue at the next record boundary.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ReadError::Record {
                source: RecordError::UnknownFunctionTag(_),
                ..
            }
        )
    }
}
