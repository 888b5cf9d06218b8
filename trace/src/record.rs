use std::mem::size_of;

use scroll::{Pread, NATIVE};

use crate::call::Call;
use crate::error::RecordError;
use crate::function::FunctionTag;

/// Kernel thread id of the caller.
pub type ThreadId = libc::pid_t;

#[cfg(target_pointer_width = "64")]
type Word = u64;
#[cfg(target_pointer_width = "32")]
type Word = u32;

/// Encoded length of one record: tid, pointer, size, auxiliary argument and
/// the one byte function tag, without padding.
pub const RECORD_SIZE: usize =
    size_of::<ThreadId>() + size_of::<usize>() + 2 * size_of::<usize>() + size_of::<u8>();

/// One observed call into the allocator.
///
/// How `size` and `auxiliary` are used depends on `function`, see [`Call`].
/// Fields a function does not use are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocationEvent {
    pub thread_id: ThreadId,
    pub pointer: usize,
    pub size: usize,
    pub auxiliary: usize,
    pub function: FunctionTag,
}

impl AllocationEvent {
    pub fn new(
        thread_id: ThreadId,
        function: FunctionTag,
        pointer: usize,
        size: usize,
        auxiliary: usize,
    ) -> Self {
        AllocationEvent {
            thread_id,
            pointer,
            size,
            auxiliary,
            function,
        }
    }

    /// Builds the record a producer emits for `call` on thread `thread_id`.
    pub fn from_call(thread_id: ThreadId, call: Call) -> Self {
        let (function, pointer, size, auxiliary) = call.into_fields();
        AllocationEvent::new(thread_id, function, pointer, size, auxiliary)
    }

    /// Typed view of the arguments according to the function tag.
    pub fn call(&self) -> Call {
        Call::from_fields(self.function, self.pointer, self.size, self.auxiliary)
    }

    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        let mut offset = 0;
        for field in [
            &self.thread_id.to_ne_bytes()[..],
            &(self.pointer as Word).to_ne_bytes()[..],
            &(self.size as Word).to_ne_bytes()[..],
            &(self.auxiliary as Word).to_ne_bytes()[..],
            &[u8::from(self.function)][..],
        ] {
            buf[offset..offset + field.len()].copy_from_slice(field);
            offset += field.len();
        }
        debug_assert_eq!(offset, RECORD_SIZE);
        buf
    }

    /// Writes the record into `buf`, which must be exactly [`RECORD_SIZE`] bytes.
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<(), RecordError> {
        if buf.len() != RECORD_SIZE {
            return Err(RecordError::MalformedRecord { len: buf.len() });
        }
        buf.copy_from_slice(&self.encode());
        Ok(())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        if bytes.len() != RECORD_SIZE {
            return Err(RecordError::MalformedRecord { len: bytes.len() });
        }
        let offset = &mut 0;
        let thread_id: ThreadId = bytes.gread_with(offset, NATIVE)?;
        let pointer: Word = bytes.gread_with(offset, NATIVE)?;
        let size: Word = bytes.gread_with(offset, NATIVE)?;
        let auxiliary: Word = bytes.gread_with(offset, NATIVE)?;
        let tag: u8 = bytes.gread_with(offset, NATIVE)?;

        Ok(AllocationEvent {
            thread_id,
            pointer: pointer as usize,
            size: size as usize,
            auxiliary: auxiliary as usize,
            function: FunctionTag::try_from(tag)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The C declaration the format was defined by.
    #[allow(dead_code)]
    #[repr(C, packed)]
    struct PackedTrace {
        tid: libc::pid_t,
        ptr: *mut libc::c_void,
        size: libc::size_t,
        var_arg: libc::size_t,
        func: libc::c_char,
    }

    #[test]
    fn size_matches_packed_c_struct() {
        assert_eq!(RECORD_SIZE, size_of::<PackedTrace>());
    }

    #[test]
    fn malloc_event_survives_encoding() {
        let event = AllocationEvent::new(1234, FunctionTag::Malloc, 0xDEADBEEF, 64, 0);
        let bytes = event.encode();
        assert_eq!(bytes.len(), RECORD_SIZE);
        assert_eq!(AllocationEvent::decode(&bytes).unwrap(), event);
    }

    #[test]
    fn fields_are_laid_out_in_order() {
        let event = AllocationEvent::new(7, FunctionTag::Calloc, 0x1000, 16, 4);
        let bytes = event.encode();
        let tid = size_of::<ThreadId>();
        let word = size_of::<usize>();

        assert_eq!(&bytes[..tid], &(7 as ThreadId).to_ne_bytes()[..]);
        assert_eq!(&bytes[tid..tid + word], &0x1000usize.to_ne_bytes()[..]);
        assert_eq!(&bytes[tid + word..tid + 2 * word], &16usize.to_ne_bytes()[..]);
        assert_eq!(&bytes[tid + 2 * word..tid + 3 * word], &4usize.to_ne_bytes()[..]);
        assert_eq!(bytes[RECORD_SIZE - 1], FunctionTag::Calloc as u8);
    }

    #[test]
    fn free_keeps_zeroed_size_fields() {
        let event = AllocationEvent::new(0, FunctionTag::Free, 0xDEADBEEF, 0, 0);
        let bytes = event.encode();
        let start = size_of::<ThreadId>() + size_of::<usize>();

        assert!(bytes[start..RECORD_SIZE - 1].iter().all(|b| *b == 0));
        assert_eq!(bytes[RECORD_SIZE - 1], 1);

        let decoded = AllocationEvent::decode(&bytes).unwrap();
        assert_eq!(decoded.call(), Call::Free { ptr: 0xDEADBEEF });
        assert_eq!(decoded.call().requested_bytes(), None);
    }

    #[test]
    fn truncated_record_is_malformed() {
        let bytes = AllocationEvent::new(1, FunctionTag::Malloc, 0x10, 8, 0).encode();
        assert!(matches!(
            AllocationEvent::decode(&bytes[..RECORD_SIZE - 1]),
            Err(RecordError::MalformedRecord { len }) if len == RECORD_SIZE - 1
        ));

        let mut long = bytes.to_vec();
        long.push(0);
        assert!(matches!(
            AllocationEvent::decode(&long),
            Err(RecordError::MalformedRecord { .. })
        ));
        assert!(matches!(
            AllocationEvent::decode(&[]),
            Err(RecordError::MalformedRecord { len: 0 })
        ));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let mut bytes = AllocationEvent::new(1, FunctionTag::Malloc, 0x10, 8, 0).encode();
        bytes[RECORD_SIZE - 1] = 9;
        assert!(matches!(
            AllocationEvent::decode(&bytes),
            Err(RecordError::UnknownFunctionTag(9))
        ));
    }

    #[test]
    fn encode_into_checks_buffer_length() {
        let event = AllocationEvent::new(1, FunctionTag::Valloc, 0x1000, 4096, 0);
        let mut short = [0u8; RECORD_SIZE - 1];
        assert!(event.encode_into(&mut short).is_err());

        let mut exact = [0xffu8; RECORD_SIZE];
        event.encode_into(&mut exact).unwrap();
        assert_eq!(exact, event.encode());
    }
}
