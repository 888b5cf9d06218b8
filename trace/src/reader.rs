use std::io::{self, Read};

use crate::error::{ReadError, RecordError};
use crate::record::{AllocationEvent, RECORD_SIZE};

/// Splits a byte stream into fixed-size records.
///
/// A record with an unknown function tag is reported and skipped, reading
/// resumes at the next record boundary. A short trailing record is reported
/// once and ends the stream, as does any I/O error.
pub struct TraceReader<R> {
    inner: R,
    offset: u64,
    buf: [u8; RECORD_SIZE],
    done: bool,
}

impl<R: Read> TraceReader<R> {
    pub fn new(inner: R) -> Self {
        TraceReader {
            inner,
            offset: 0,
            buf: [0; RECORD_SIZE],
            done: false,
        }
    }

    /// Number of bytes consumed so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn fill(&mut self) -> io::Result<usize> {
        let mut filled = 0;
        while filled < RECORD_SIZE {
            match self.inner.read(&mut self.buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl<R: Read> Iterator for TraceReader<R> {
    type Item = Result<AllocationEvent, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let filled = match self.fill() {
            Ok(filled) => filled,
            Err(e) => {
                self.done = true;
                return Some(Err(e.into()));
            }
        };
        if filled == 0 {
            self.done = true;
            return None;
        }

        let offset = self.offset;
        self.offset += filled as u64;

        if filled < RECORD_SIZE {
            self.done = true;
            return Some(Err(ReadError::Record {
                offset,
                source: RecordError::MalformedRecord { len: filled },
            }));
        }

        Some(
            AllocationEvent::decode(&self.buf)
                .map_err(|source| ReadError::Record { offset, source }),
        )
    }
}
