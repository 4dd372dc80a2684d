//! Diff opcodes and the change index built from them.
//!
//! This crate is pure data: no I/O, no threads. The tracker owns one
//! [`ChangeIndex`] per document and swaps it wholesale after every fetch.

use thiserror::Error;

pub mod diff;
pub mod index;
pub mod opcode;

pub use diff::{DiffAlgorithm, DiffEngine, SimilarDiff};
pub use index::{ChangeIndex, ChangeSummary};
pub use opcode::{DiffOpcode, DiffTag};

/// Internal-consistency faults raised while building an index.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("unexpected diff opcode tag: {0}")]
    UnsupportedDiffTag(String),

    #[error("malformed diff opcode {opcode}: {reason}")]
    MalformedOpcode {
        opcode: DiffOpcode,
        reason: &'static str,
    },

    #[error("unknown diff algorithm: {0}")]
    UnknownAlgorithm(String),
}
