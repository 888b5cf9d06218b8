//! Per-function meaning of the record fields.
//!
//! A record does not describe its own argument layout. The interposed
//! allocator fills the fields as follows, and every consumer has to agree:
//!
//! | function         | pointer        | size         | auxiliary     |
//! |------------------|----------------|--------------|---------------|
//! | `malloc`         | returned block | size         | 0             |
//! | `free`           | released block | 0            | 0             |
//! | `realloc`        | returned block | new size     | old pointer   |
//! | `calloc`         | returned block | element size | element count |
//! | `memalign`       | returned block | size         | alignment     |
//! | `posix_memalign` | stored block   | size         | alignment     |
//! | `valloc`         | returned block | size         | 0             |
//! | `pvalloc`        | returned block | size         | 0             |
//! | `aligned_alloc`  | returned block | size         | alignment     |

use std::fmt;

use crate::function::FunctionTag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    Malloc {
        size: usize,
        result: usize,
    },
    Free {
        ptr: usize,
    },
    Realloc {
        old: usize,
        size: usize,
        result: usize,
    },
    Calloc {
        nmemb: usize,
        size: usize,
        result: usize,
    },
    Memalign {
        alignment: usize,
        size: usize,
        result: usize,
    },
    PosixMemalign {
        alignment: usize,
        size: usize,
        result: usize,
    },
    Valloc {
        size: usize,
        result: usize,
    },
    Pvalloc {
        size: usize,
        result: usize,
    },
    AlignedAlloc {
        alignment: usize,
        size: usize,
        result: usize,
    },
}

impl Call {
    pub(crate) fn from_fields(
        function: FunctionTag,
        pointer: usize,
        size: usize,
        auxiliary: usize,
    ) -> Self {
        let result = pointer;
        match function {
            FunctionTag::Malloc => Call::Malloc { size, result },
            FunctionTag::Free => Call::Free { ptr: pointer },
            FunctionTag::Realloc => Call::Realloc {
                old: auxiliary,
                size,
                result,
            },
            FunctionTag::Calloc => Call::Calloc {
                nmemb: auxiliary,
                size,
                result,
            },
            FunctionTag::Memalign => Call::Memalign {
                alignment: auxiliary,
                size,
                result,
            },
            FunctionTag::PosixMemalign => Call::PosixMemalign {
                alignment: auxiliary,
                size,
                result,
            },
            FunctionTag::Valloc => Call::Valloc { size, result },
            FunctionTag::Pvalloc => Call::Pvalloc { size, result },
            FunctionTag::AlignedAlloc => Call::AlignedAlloc {
                alignment: auxiliary,
                size,
                result,
            },
        }
    }

    /// (function, pointer, size, auxiliary)
    pub(crate) fn into_fields(self) -> (FunctionTag, usize, usize, usize) {
        match self {
            Call::Malloc { size, result } => (FunctionTag::Malloc, result, size, 0),
            Call::Free { ptr } => (FunctionTag::Free, ptr, 0, 0),
            Call::Realloc { old, size, result } => (FunctionTag::Realloc, result, size, old),
            Call::Calloc {
                nmemb,
                size,
                result,
            } => (FunctionTag::Calloc, result, size, nmemb),
            Call::Memalign {
                alignment,
                size,
                result,
            } => (FunctionTag::Memalign, result, size, alignment),
            Call::PosixMemalign {
                alignment,
                size,
                result,
            } => (FunctionTag::PosixMemalign, result, size, alignment),
            Call::Valloc { size, result } => (FunctionTag::Valloc, result, size, 0),
            Call::Pvalloc { size, result } => (FunctionTag::Pvalloc, result, size, 0),
            Call::AlignedAlloc {
                alignment,
                size,
                result,
            } => (FunctionTag::AlignedAlloc, result, size, alignment),
        }
    }

    pub fn function(&self) -> FunctionTag {
        self.into_fields().0
    }

    /// Bytes the caller asked for. `None` for `free`.
    pub fn requested_bytes(&self) -> Option<usize> {
        match *self {
            Call::Free { .. } => None,
            Call::Calloc { nmemb, size, .. } => Some(nmemb.saturating_mul(size)),
            Call::Malloc { size, .. }
            | Call::Realloc { size, .. }
            | Call::Memalign { size, .. }
            | Call::PosixMemalign { size, .. }
            | Call::Valloc { size, .. }
            | Call::Pvalloc { size, .. }
            | Call::AlignedAlloc { size, .. } => Some(size),
        }
    }

    /// Pointer handed out by the call, null if the allocation failed.
    pub fn result(&self) -> Option<usize> {
        match *self {
            Call::Free { .. } => None,
            Call::Malloc { result, .. }
            | Call::Realloc { result, .. }
            | Call::Calloc { result, .. }
            | Call::Memalign { result, .. }
            | Call::PosixMemalign { result, .. }
            | Call::Valloc { result, .. }
            | Call::Pvalloc { result, .. }
            | Call::AlignedAlloc { result, .. } => Some(result),
        }
    }

    /// Pointer given back to the allocator, if any.
    pub fn released(&self) -> Option<usize> {
        match *self {
            Call::Free { ptr } => Some(ptr),
            Call::Realloc { old, .. } => Some(old),
            _ => None,
        }
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.function();
        match *self {
            Call::Free { ptr } => write!(f, "{name}({ptr:#x})"),
            Call::Malloc { size, result }
            | Call::Valloc { size, result }
            | Call::Pvalloc { size, result } => write!(f, "{name}({size}) = {result:#x}"),
            Call::Realloc { old, size, result } => {
                write!(f, "{name}({old:#x}, {size}) = {result:#x}")
            }
            Call::Calloc {
                nmemb,
                size,
                result,
            } => write!(f, "{name}({nmemb}, {size}) = {result:#x}"),
            Call::Memalign {
                alignment,
                size,
                result,
            }
            | Call::AlignedAlloc {
                alignment,
                size,
                result,
            } => write!(f, "{name}({alignment}, {size}) = {result:#x}"),
            Call::PosixMemalign {
                alignment,
                size,
                result,
            } => write!(f, "{name}(&{result:#x}, {alignment}, {size})"),
        }
    }
}
