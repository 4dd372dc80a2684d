//! Line-level diff opcodes.
//!
//! An opcode pairs a half-open reference range `[i1, i2)` with the matching
//! current range `[j1, j2)`. Streams are ordered and coordinate consistent:
//! `i2`/`j2` never decrease from one opcode to the next.

use crate::IndexError;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffTag {
    Equal,
    Insert,
    Delete,
    Replace,
}

impl DiffTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiffTag::Equal => "equal",
            DiffTag::Insert => "insert",
            DiffTag::Delete => "delete",
            DiffTag::Replace => "replace",
        }
    }
}

impl fmt::Display for DiffTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses the difflib-style tag names emitted by external diff engines.
impl FromStr for DiffTag {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "equal" => Ok(DiffTag::Equal),
            "insert" => Ok(DiffTag::Insert),
            "delete" => Ok(DiffTag::Delete),
            "replace" => Ok(DiffTag::Replace),
            other => Err(IndexError::UnsupportedDiffTag(other.to_string())),
        }
    }
}

impl From<similar::DiffTag> for DiffTag {
    fn from(tag: similar::DiffTag) -> Self {
        match tag {
            similar::DiffTag::Equal => DiffTag::Equal,
            similar::DiffTag::Insert => DiffTag::Insert,
            similar::DiffTag::Delete => DiffTag::Delete,
            similar::DiffTag::Replace => DiffTag::Replace,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiffOpcode {
    pub tag: DiffTag,
    pub i1: usize,
    pub i2: usize,
    pub j1: usize,
    pub j2: usize,
}

impl DiffOpcode {
    pub const fn new(tag: DiffTag, i1: usize, i2: usize, j1: usize, j2: usize) -> Self {
        Self {
            tag,
            i1,
            i2,
            j1,
            j2,
        }
    }

    pub const fn equal(i1: usize, i2: usize, j1: usize, j2: usize) -> Self {
        Self::new(DiffTag::Equal, i1, i2, j1, j2)
    }

    pub const fn insert(i1: usize, i2: usize, j1: usize, j2: usize) -> Self {
        Self::new(DiffTag::Insert, i1, i2, j1, j2)
    }

    pub const fn delete(i1: usize, i2: usize, j1: usize, j2: usize) -> Self {
        Self::new(DiffTag::Delete, i1, i2, j1, j2)
    }

    pub const fn replace(i1: usize, i2: usize, j1: usize, j2: usize) -> Self {
        Self::new(DiffTag::Replace, i1, i2, j1, j2)
    }

    /// Build an opcode from a tag name plus coordinates (difflib tuple shape).
    pub fn parse(tag: &str, i1: usize, i2: usize, j1: usize, j2: usize) -> Result<Self, IndexError> {
        Ok(Self::new(tag.parse()?, i1, i2, j1, j2))
    }

    pub fn old_range(&self) -> Range<usize> {
        self.i1..self.i2
    }

    pub fn new_range(&self) -> Range<usize> {
        self.j1..self.j2
    }

    /// Check that the ranges agree with the tag. A mismatch means the producing
    /// engine is broken, so it is reported as a fault rather than repaired.
    pub fn validate(&self) -> Result<(), IndexError> {
        let reason = if self.i1 > self.i2 || self.j1 > self.j2 {
            Some("inverted range")
        } else {
            let old_len = self.i2 - self.i1;
            let new_len = self.j2 - self.j1;
            match self.tag {
                DiffTag::Equal if old_len != new_len => Some("equal ranges differ in length"),
                DiffTag::Insert if old_len != 0 => Some("insert with non-empty reference range"),
                DiffTag::Delete if new_len != 0 => Some("delete with non-empty current range"),
                DiffTag::Replace if old_len == 0 || new_len == 0 => {
                    Some("replace with an empty side")
                }
                _ => None,
            }
        };
        match reason {
            Some(reason) => Err(IndexError::MalformedOpcode {
                opcode: *self,
                reason,
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Display for DiffOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({},{},{},{})",
            self.tag, self.i1, self.i2, self.j1, self.j2
        )
    }
}
