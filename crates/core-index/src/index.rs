//! Change index: O(1)-style lookups by current line number and change kind.
//!
//! Built wholesale from an opcode stream; never patched incrementally. All keys
//! are current-buffer line numbers. Insert and replace blocks register every
//! line they cover in `first_interesting_line` so a query on any line of the
//! block finds the block's anchor (its first line).
//!
//! Invariants:
//! * `Equal` opcodes contribute nothing.
//! * A delete whose `j1` equals the current line count anchors at `j1 - 1`; there
//!   is no line at `j1` to carry the marker.
//! * A failed build leaves the previous index untouched.

use crate::{DiffOpcode, DiffTag, IndexError};
use std::collections::BTreeMap;
use std::ops::Range;
use tracing::{debug, error};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeIndex {
    first_interesting_line: BTreeMap<usize, usize>,
    last_insertions: BTreeMap<usize, usize>,
    last_modifications: BTreeMap<usize, usize>,
    deleted_range: BTreeMap<usize, Range<usize>>,
    changed_range: BTreeMap<usize, Range<usize>>,
    inserted_old_range: BTreeMap<usize, Range<usize>>,
    /// Anchor of the delete that was moved up from the end of the buffer.
    trailing_delete: Option<usize>,
}

impl ChangeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a fresh index from `opcodes` against a buffer of `line_count` lines.
    pub fn build(opcodes: &[DiffOpcode], line_count: usize) -> Result<Self, IndexError> {
        let mut index = Self::new();
        let mut prev_ends = (0usize, 0usize);
        for op in opcodes {
            debug_assert!(
                op.i2 >= prev_ends.0 && op.j2 >= prev_ends.1,
                "opcode stream out of order at {op}"
            );
            prev_ends = (op.i2, op.j2);
            op.validate()?;
            match op.tag {
                DiffTag::Equal => {}
                DiffTag::Replace => {
                    index.last_modifications.insert(op.j1, op.j2);
                    index.changed_range.insert(op.j1, op.old_range());
                    for line in op.new_range() {
                        index.first_interesting_line.insert(line, op.j1);
                    }
                }
                DiffTag::Delete => {
                    let anchor = if op.j1 == line_count && op.j1 > 0 {
                        index.trailing_delete = Some(op.j1 - 1);
                        op.j1 - 1
                    } else {
                        op.j1
                    };
                    index.deleted_range.insert(anchor, op.old_range());
                }
                DiffTag::Insert => {
                    index.last_insertions.insert(op.j1, op.j2);
                    for line in op.new_range() {
                        index.first_interesting_line.insert(line, op.j1);
                    }
                    index.inserted_old_range.insert(op.j1, op.old_range());
                }
            }
        }
        Ok(index)
    }

    /// Replace this index with one built from `opcodes`. On failure the fault is
    /// logged and the current contents are retained.
    pub fn rebuild(
        &mut self,
        opcodes: &[DiffOpcode],
        line_count: usize,
    ) -> Result<ChangeSummary, IndexError> {
        match Self::build(opcodes, line_count) {
            Ok(next) => {
                *self = next;
                let summary = self.summary();
                debug!(
                    target: "tracker.index",
                    opcodes = opcodes.len(),
                    line_count,
                    deleted = summary.deleted.len(),
                    inserted_blocks = summary.inserted.len() / 2,
                    modified_blocks = summary.modified.len() / 2,
                    "index_rebuilt"
                );
                Ok(summary)
            }
            Err(e) => {
                error!(target: "tracker.index", %e, "index_rebuild_abandoned");
                Err(e)
            }
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        self.last_insertions.is_empty()
            && self.last_modifications.is_empty()
            && self.deleted_range.is_empty()
    }

    /// Anchor of the insert/replace block covering `line`.
    pub fn first_interesting_line(&self, line: usize) -> Option<usize> {
        self.first_interesting_line.get(&line).copied()
    }

    /// Exclusive end of the inserted block anchored at `anchor`.
    pub fn last_insertion(&self, anchor: usize) -> Option<usize> {
        self.last_insertions.get(&anchor).copied()
    }

    /// Exclusive end of the replaced block anchored at `anchor`.
    pub fn last_modification(&self, anchor: usize) -> Option<usize> {
        self.last_modifications.get(&anchor).copied()
    }

    /// Reference range removed by the delete anchored at `anchor`.
    pub fn deleted_range(&self, anchor: usize) -> Option<Range<usize>> {
        self.deleted_range.get(&anchor).cloned()
    }

    /// Current-buffer line the deleted block anchored at `anchor` used to
    /// precede. Differs from `anchor` only for a delete at the end of the buffer.
    pub fn delete_position(&self, anchor: usize) -> Option<usize> {
        self.deleted_range.get(&anchor)?;
        Some(if self.trailing_delete == Some(anchor) {
            anchor + 1
        } else {
            anchor
        })
    }

    /// Reference range replaced by the block anchored at `anchor`.
    pub fn changed_range(&self, anchor: usize) -> Option<Range<usize>> {
        self.changed_range.get(&anchor).cloned()
    }

    /// Reference position at which the block anchored at `anchor` was inserted.
    pub fn inserted_old_range(&self, anchor: usize) -> Option<Range<usize>> {
        self.inserted_old_range.get(&anchor).cloned()
    }

    /// Marker summary: deleted anchors plus flattened `(anchor, end)` pairs for
    /// insertions and modifications, each in ascending anchor order.
    pub fn summary(&self) -> ChangeSummary {
        ChangeSummary {
            deleted: self.deleted_range.keys().copied().collect(),
            inserted: flatten(&self.last_insertions),
            modified: flatten(&self.last_modifications),
        }
    }
}

fn flatten(map: &BTreeMap<usize, usize>) -> Vec<usize> {
    map.iter().flat_map(|(&a, &b)| [a, b]).collect()
}

/// Line-number triple delivered to change handlers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSummary {
    pub deleted: Vec<usize>,
    /// Flattened `(anchor, end)` pairs.
    pub inserted: Vec<usize>,
    /// Flattened `(anchor, end)` pairs.
    pub modified: Vec<usize>,
}

impl ChangeSummary {
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.inserted.is_empty() && self.modified.is_empty()
    }

    pub fn inserted_ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        pairs(&self.inserted)
    }

    pub fn modified_ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        pairs(&self.modified)
    }
}

fn pairs(flat: &[usize]) -> impl Iterator<Item = Range<usize>> + '_ {
    flat.chunks_exact(2).map(|p| p[0]..p[1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn replace_populates_modification_tables() {
        let ops = [
            DiffOpcode::equal(0, 1, 0, 1),
            DiffOpcode::replace(1, 2, 1, 3),
            DiffOpcode::equal(2, 3, 3, 4),
        ];
        let idx = ChangeIndex::build(&ops, 4).unwrap();
        assert_eq!(idx.changed_range(1), Some(1..2));
        assert_eq!(idx.last_modification(1), Some(3));
        assert_eq!(idx.first_interesting_line(1), Some(1));
        assert_eq!(idx.first_interesting_line(2), Some(1));
        assert_eq!(idx.first_interesting_line(3), None);
        assert_eq!(idx.summary().modified, vec![1, 3]);
    }

    #[test]
    fn insert_populates_insertion_tables() {
        let ops = [DiffOpcode::equal(0, 2, 0, 2), DiffOpcode::insert(2, 2, 2, 3)];
        let idx = ChangeIndex::build(&ops, 3).unwrap();
        assert_eq!(idx.inserted_old_range(2), Some(2..2));
        assert_eq!(idx.last_insertion(2), Some(3));
        assert_eq!(idx.first_interesting_line(2), Some(2));
        assert_eq!(
            idx.summary(),
            ChangeSummary {
                deleted: vec![],
                inserted: vec![2, 3],
                modified: vec![]
            }
        );
    }

    #[test]
    fn delete_in_middle_anchors_at_j1() {
        let ops = [
            DiffOpcode::equal(0, 1, 0, 1),
            DiffOpcode::delete(1, 2, 1, 1),
            DiffOpcode::equal(2, 3, 1, 2),
        ];
        let idx = ChangeIndex::build(&ops, 2).unwrap();
        assert_eq!(idx.deleted_range(1), Some(1..2));
        assert_eq!(idx.summary().deleted, vec![1]);
    }

    #[test]
    fn delete_at_end_of_buffer_anchors_on_previous_line() {
        let ops = [DiffOpcode::equal(0, 2, 0, 2), DiffOpcode::delete(2, 4, 2, 2)];
        let idx = ChangeIndex::build(&ops, 2).unwrap();
        assert_eq!(idx.deleted_range(2), None);
        assert_eq!(idx.deleted_range(1), Some(2..4));
        assert_eq!(idx.delete_position(1), Some(2));
        assert_eq!(idx.summary().deleted, vec![1]);
    }

    #[test]
    fn delete_position_in_middle_is_anchor() {
        let ops = [DiffOpcode::delete(0, 1, 0, 0), DiffOpcode::equal(1, 2, 0, 1)];
        let idx = ChangeIndex::build(&ops, 1).unwrap();
        assert_eq!(idx.delete_position(0), Some(0));
        assert_eq!(idx.delete_position(5), None);
    }

    #[test]
    fn delete_everything_from_empty_buffer_stays_at_zero() {
        let ops = [DiffOpcode::delete(0, 3, 0, 0)];
        let idx = ChangeIndex::build(&ops, 0).unwrap();
        assert_eq!(idx.deleted_range(0), Some(0..3));
    }

    #[test]
    fn failed_rebuild_retains_previous_index() {
        let mut idx = ChangeIndex::new();
        idx.rebuild(&[DiffOpcode::insert(0, 0, 0, 1)], 1).unwrap();
        let before = idx.clone();
        let bad = [DiffOpcode::insert(0, 1, 0, 1)];
        assert!(idx.rebuild(&bad, 1).is_err());
        assert_eq!(idx, before);
    }

    #[test]
    fn rebuild_clears_stale_entries() {
        let mut idx = ChangeIndex::new();
        idx.rebuild(&[DiffOpcode::replace(0, 1, 0, 1)], 1).unwrap();
        let summary = idx.rebuild(&[DiffOpcode::equal(0, 1, 0, 1)], 1).unwrap();
        assert!(summary.is_empty());
        assert!(idx.is_empty());
        assert_eq!(idx.first_interesting_line(0), None);
    }

    #[test]
    fn summary_range_iterators() {
        let s = ChangeSummary {
            deleted: vec![],
            inserted: vec![2, 4, 7, 8],
            modified: vec![0, 1],
        };
        assert_eq!(s.inserted_ranges().collect::<Vec<_>>(), vec![2..4, 7..8]);
        assert_eq!(s.modified_ranges().collect::<Vec<_>>(), vec![0..1]);
    }
}
