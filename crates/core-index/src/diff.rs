//! Opcode producers.
//!
//! The diff algorithm is a black box behind [`DiffEngine`]; the default
//! implementation delegates to `similar` and maps its ops one-to-one.

use crate::{DiffOpcode, IndexError};
use similar::{Algorithm, capture_diff_slices};
use std::str::FromStr;

/// Produces an ordered opcode stream from (reference lines, current lines).
/// Both sides must use the same terminator convention.
pub trait DiffEngine: Send + Sync {
    fn opcodes(&self, reference: &[String], current: &[String]) -> Vec<DiffOpcode>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DiffAlgorithm {
    #[default]
    Myers,
    Patience,
    Lcs,
}

impl FromStr for DiffAlgorithm {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "myers" => Ok(DiffAlgorithm::Myers),
            "patience" => Ok(DiffAlgorithm::Patience),
            "lcs" => Ok(DiffAlgorithm::Lcs),
            other => Err(IndexError::UnknownAlgorithm(other.to_string())),
        }
    }
}

impl From<DiffAlgorithm> for Algorithm {
    fn from(alg: DiffAlgorithm) -> Self {
        match alg {
            DiffAlgorithm::Myers => Algorithm::Myers,
            DiffAlgorithm::Patience => Algorithm::Patience,
            DiffAlgorithm::Lcs => Algorithm::Lcs,
        }
    }
}

/// `similar`-backed engine. Adjacent delete/insert runs come out as a single
/// `Replace`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimilarDiff {
    algorithm: DiffAlgorithm,
}

impl SimilarDiff {
    pub fn new(algorithm: DiffAlgorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> DiffAlgorithm {
        self.algorithm
    }
}

impl DiffEngine for SimilarDiff {
    fn opcodes(&self, reference: &[String], current: &[String]) -> Vec<DiffOpcode> {
        capture_diff_slices(self.algorithm.into(), reference, current)
            .iter()
            .map(|op| {
                let (tag, old, new) = op.as_tag_tuple();
                DiffOpcode::new(tag.into(), old.start, old.end, new.start, new.end)
            })
            .collect()
    }
}
