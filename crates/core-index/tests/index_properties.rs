//! Property-based tests for ChangeIndex construction.

use core_index::{ChangeIndex, ChangeSummary, DiffOpcode, DiffTag};
use proptest::prelude::*;

/// Turn (tag selector, old len, new len) segments into a coordinate-consistent
/// opcode stream. Consecutive deletes are merged so every delete anchor is unique.
fn stream(segments: &[(u8, usize, usize)]) -> (Vec<DiffOpcode>, usize) {
    let (mut i, mut j) = (0usize, 0usize);
    let mut ops: Vec<DiffOpcode> = Vec::new();
    for &(sel, a, b) in segments {
        let tag = match sel % 4 {
            0 => DiffTag::Equal,
            1 => DiffTag::Insert,
            2 => DiffTag::Delete,
            _ => DiffTag::Replace,
        };
        if tag == DiffTag::Delete && ops.last().is_some_and(|op| op.tag == DiffTag::Delete) {
            continue;
        }
        let (old_len, new_len) = match tag {
            DiffTag::Equal => (a, a),
            DiffTag::Insert => (0, b),
            DiffTag::Delete => (a, 0),
            DiffTag::Replace => (a, b),
        };
        ops.push(DiffOpcode::new(tag, i, i + old_len, j, j + new_len));
        i += old_len;
        j += new_len;
    }
    (ops, j)
}

fn segments() -> impl Strategy<Value = Vec<(u8, usize, usize)>> {
    prop::collection::vec((0u8..4, 1usize..6, 1usize..6), 0..24)
}

proptest! {
    #[test]
    fn equal_only_streams_have_empty_summary(lens in prop::collection::vec(1usize..10, 0..16)) {
        let mut ops = Vec::new();
        let mut at = 0;
        for len in lens {
            ops.push(DiffOpcode::equal(at, at + len, at, at + len));
            at += len;
        }
        let idx = ChangeIndex::build(&ops, at + 1).unwrap();
        prop_assert_eq!(idx.summary(), ChangeSummary::default());
    }

    #[test]
    fn replace_and_insert_tables_match_opcodes(segs in segments()) {
        let (ops, total) = stream(&segs);
        // One extra line so no delete lands at end of buffer.
        let idx = ChangeIndex::build(&ops, total + 1).unwrap();
        for op in &ops {
            match op.tag {
                DiffTag::Replace => {
                    prop_assert_eq!(idx.changed_range(op.j1), Some(op.i1..op.i2));
                    prop_assert_eq!(idx.last_modification(op.j1), Some(op.j2));
                    for k in op.j1..op.j2 {
                        prop_assert_eq!(idx.first_interesting_line(k), Some(op.j1));
                    }
                }
                DiffTag::Insert => {
                    prop_assert_eq!(idx.inserted_old_range(op.j1), Some(op.i1..op.i2));
                    prop_assert_eq!(idx.last_insertion(op.j1), Some(op.j2));
                    for k in op.j1..op.j2 {
                        prop_assert_eq!(idx.first_interesting_line(k), Some(op.j1));
                    }
                }
                DiffTag::Delete => {
                    prop_assert_eq!(idx.deleted_range(op.j1), Some(op.i1..op.i2));
                }
                DiffTag::Equal => {
                    for k in op.j1..op.j2 {
                        prop_assert_eq!(idx.first_interesting_line(k), None);
                    }
                }
            }
        }
    }

    #[test]
    fn rebuild_is_idempotent(segs in segments()) {
        let (ops, total) = stream(&segs);
        let first = ChangeIndex::build(&ops, total).unwrap();
        let second = ChangeIndex::build(&ops, total).unwrap();
        prop_assert_eq!(&first, &second);

        let mut reused = first.clone();
        reused.rebuild(&ops, total).unwrap();
        prop_assert_eq!(reused, first);
    }

    #[test]
    fn trailing_delete_anchors_on_previous_line(kept in 1usize..20, removed in 1usize..20) {
        let ops = [
            DiffOpcode::equal(0, kept, 0, kept),
            DiffOpcode::delete(kept, kept + removed, kept, kept),
        ];
        let idx = ChangeIndex::build(&ops, kept).unwrap();
        prop_assert_eq!(idx.deleted_range(kept - 1), Some(kept..kept + removed));
        prop_assert_eq!(idx.deleted_range(kept), None);
    }
}

#[test]
fn scenario_replace() {
    let idx = ChangeIndex::build(
        &[
            DiffOpcode::equal(0, 1, 0, 1),
            DiffOpcode::replace(1, 2, 1, 2),
            DiffOpcode::equal(2, 3, 2, 3),
        ],
        3,
    )
    .unwrap();
    let s = idx.summary();
    assert!(s.deleted.is_empty());
    assert!(s.inserted.is_empty());
    assert_eq!(s.modified, vec![1, 2]);
}

#[test]
fn scenario_insert() {
    let idx = ChangeIndex::build(
        &[
            DiffOpcode::equal(0, 2, 0, 2),
            DiffOpcode::insert(2, 2, 2, 3),
            DiffOpcode::equal(2, 3, 3, 4),
        ],
        4,
    )
    .unwrap();
    let s = idx.summary();
    assert_eq!(s.inserted, vec![2, 3]);
    assert!(s.deleted.is_empty() && s.modified.is_empty());
}

#[test]
fn scenario_trailing_delete() {
    let idx = ChangeIndex::build(
        &[DiffOpcode::equal(0, 2, 0, 2), DiffOpcode::delete(2, 4, 2, 2)],
        2,
    )
    .unwrap();
    assert_eq!(idx.deleted_range(1), Some(2..4));
    assert_eq!(idx.summary().deleted, vec![1]);
}
