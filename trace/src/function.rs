use std::fmt;
use std::str::FromStr;

use crate::error::RecordError;

/// The allocator entry point that produced a record.
///
/// Discriminants are part of the wire format and must never be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum FunctionTag {
    Malloc = 0,
    Free = 1,
    Realloc = 2,
    Calloc = 3,
    Memalign = 4,
    PosixMemalign = 5,
    Valloc = 6,
    Pvalloc = 7,
    AlignedAlloc = 8,
}

impl FunctionTag {
    pub const ALL: [FunctionTag; 9] = [
        FunctionTag::Malloc,
        FunctionTag::Free,
        FunctionTag::Realloc,
        FunctionTag::Calloc,
        FunctionTag::Memalign,
        FunctionTag::PosixMemalign,
        FunctionTag::Valloc,
        FunctionTag::Pvalloc,
        FunctionTag::AlignedAlloc,
    ];

    /// Name of the C symbol.
    pub fn name(self) -> &'static str {
        match self {
            FunctionTag::Malloc => "malloc",
            FunctionTag::Free => "free",
            FunctionTag::Realloc => "realloc",
            FunctionTag::Calloc => "calloc",
            FunctionTag::Memalign => "memalign",
            FunctionTag::PosixMemalign => "posix_memalign",
            FunctionTag::Valloc => "valloc",
            FunctionTag::Pvalloc => "pvalloc",
            FunctionTag::AlignedAlloc => "aligned_alloc",
        }
    }

    /// True for every entry point that hands out memory.
    pub fn allocates(self) -> bool {
        self != FunctionTag::Free
    }
}

impl From<FunctionTag> for u8 {
    fn from(tag: FunctionTag) -> u8 {
        tag as u8
    }
}

impl TryFrom<u8> for FunctionTag {
    type Error = RecordError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        FunctionTag::ALL
            .get(value as usize)
            .copied()
            .ok_or(RecordError::UnknownFunctionTag(value))
    }
}

impl fmt::Display for FunctionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FunctionTag {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FunctionTag::ALL
            .into_iter()
            .find(|tag| tag.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| RecordError::UnknownFunctionName(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discriminants_are_stable() {
        for (i, tag) in FunctionTag::ALL.iter().enumerate() {
            assert_eq!(u8::from(*tag) as usize, i);
        }
        assert_eq!(FunctionTag::AlignedAlloc as u8, 8);
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(matches!(
            FunctionTag::try_from(9),
            Err(RecordError::UnknownFunctionTag(9))
        ));
        assert!(FunctionTag::try_from(255).is_err());
    }

    #[test]
    fn parses_names() {
        assert_eq!(
            "posix_memalign".parse::<FunctionTag>().unwrap(),
            FunctionTag::PosixMemalign
        );
        assert_eq!("MALLOC".parse::<FunctionTag>().unwrap(), FunctionTag::Malloc);
        assert!("mmap".parse::<FunctionTag>().is_err());
    }
}
