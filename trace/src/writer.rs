use std::io::{self, Write};

use crate::record::AllocationEvent;

/// Appends records to a byte sink.
///
/// Every record goes out through a single `write_all` of the whole encoded
/// buffer. Whether that is atomic with respect to other writers depends on the
/// sink, e.g. a pipe guarantees it for writes up to `PIPE_BUF`.
pub struct TraceWriter<W> {
    inner: W,
    written: u64,
}

impl<W: Write> TraceWriter<W> {
    pub fn new(inner: W) -> Self {
        TraceWriter { inner, written: 0 }
    }

    pub fn write(&mut self, event: &AllocationEvent) -> io::Result<()> {
        self.inner.write_all(&event.encode())?;
        self.written += 1;
        Ok(())
    }

    /// Records written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
