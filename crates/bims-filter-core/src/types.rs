//! Identifier types for groups and clauses

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a filter group.
///
/// Assigned from a monotonic counter and never reused within a builder,
/// even after the group is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub u32);

/// Identifier of a filter clause. Same allocation rules as [`GroupId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClauseId(pub u32);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

impl fmt::Display for ClauseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

impl From<u32> for GroupId {
    fn from(id: u32) -> Self {
        GroupId(id)
    }
}

impl From<u32> for ClauseId {
    fn from(id: u32) -> Self {
        ClauseId(id)
    }
}

/// Monotonic id allocator. Starts at 1.
#[derive(Debug, Clone, Default)]
pub(crate) struct Sequence {
    last: u32,
}

impl Sequence {
    pub(crate) fn next(&mut self) -> u32 {
        self.last += 1;
        self.last
    }

    pub(crate) fn reset(&mut self) {
        self.last = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_is_monotonic() {
        let mut seq = Sequence::default();
        assert_eq!(seq.next(), 1);
        assert_eq!(seq.next(), 2);
        seq.reset();
        assert_eq!(seq.next(), 1);
    }

    #[test]
    fn test_display() {
        assert_eq!(GroupId(3).to_string(), "g3");
        assert_eq!(ClauseId(7).to_string(), "c7");
    }
}
