//! Fixed-layout allocation trace records.
//!
//! A trace is a flat sequence of [`AllocationEvent`] records, each exactly
//! [`RECORD_SIZE`] bytes long, written by an interposed allocator and read back
//! by any consumer running on the same platform.

pub mod call;
pub mod error;
pub mod function;
pub mod reader;
pub mod record;
pub mod writer;

pub use call::Call;
pub use error::{ReadError, RecordError};
pub use function::FunctionTag;
pub use reader::TraceReader;
pub use record::{AllocationEvent, ThreadId, RECORD_SIZE};
pub use writer::TraceWriter;
