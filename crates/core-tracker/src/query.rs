//! Line queries over the current index.
//!
//! `resolve` answers "what changed at line N" for one change kind with the raw
//! old (reference) and new (current buffer) text. A line that is not part of a
//! change of that kind yields [`LineChange::empty`] rather than an error.

use crate::tracker::IndexedState;
use core_text::{Buffer, has_eol, split_lines};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeKind {
    Insert,
    Delete,
    Replace,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Delete => "delete",
            ChangeKind::Replace => "replace",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "insert" => Ok(ChangeKind::Insert),
            "delete" => Ok(ChangeKind::Delete),
            "replace" => Ok(ChangeKind::Replace),
            other => Err(format!("unknown change kind: {other}")),
        }
    }
}

/// One change as seen from a line. Ranges are half-open line ranges: `old_range`
/// in reference coordinates, `new_range` in current-buffer coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineChange {
    pub kind: Option<ChangeKind>,
    pub old_ends_with_eol: bool,
    pub new_ends_with_eol: bool,
    pub old_range: Option<Range<usize>>,
    pub new_range: Option<Range<usize>>,
    pub old_lines: Vec<String>,
    pub new_lines: Vec<String>,
}

impl LineChange {
    /// The "no match" result.
    pub fn empty() -> Self {
        Self {
            kind: None,
            old_ends_with_eol: true,
            new_ends_with_eol: true,
            old_range: None,
            new_range: None,
            old_lines: Vec::new(),
            new_lines: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.kind.is_none()
    }
}

/// Last line/kind passed to `query`; substituted when a call omits them.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct QueryMemory {
    last_line: Option<usize>,
    last_kind: Option<ChangeKind>,
}

impl QueryMemory {
    pub(crate) fn resolve(
        &mut self,
        line: Option<usize>,
        kind: Option<ChangeKind>,
    ) -> (Option<usize>, Option<ChangeKind>) {
        let line = line.or(self.last_line);
        let kind = kind.or(self.last_kind);
        self.last_line = line;
        self.last_kind = kind;
        (line, kind)
    }
}

pub(crate) fn resolve(
    state: &IndexedState,
    buffer: Option<&Buffer>,
    line: usize,
    kind: ChangeKind,
) -> LineChange {
    let index = &state.index;
    let anchor = match kind {
        ChangeKind::Delete => line,
        ChangeKind::Insert | ChangeKind::Replace => match index.first_interesting_line(line) {
            Some(anchor) => anchor,
            None => {
                debug!(target: "tracker.query", line, %kind, "line_not_in_change");
                return LineChange::empty();
            }
        },
    };

    let mut change = LineChange::empty();
    change.kind = Some(kind);

    if kind != ChangeKind::Insert {
        let old_range = match kind {
            ChangeKind::Replace => index.changed_range(anchor),
            _ => index.deleted_range(anchor),
        };
        let Some(old_range) = old_range else {
            warn!(target: "tracker.query", anchor, %kind, "anchor_missing_old_range");
            return LineChange::empty();
        };
        let at = index.delete_position(anchor).unwrap_or(anchor);
        change.new_range = Some(at..at);
        change.old_lines = state.reference.slice_stripped(old_range.clone());
        change.old_ends_with_eol = state.reference.range_ends_with_eol(old_range.clone());
        change.old_range = Some(old_range);
    }

    if kind != ChangeKind::Delete {
        let end = match kind {
            ChangeKind::Replace => index.last_modification(anchor),
            _ => index.last_insertion(anchor),
        };
        let Some(end) = end else {
            warn!(target: "tracker.query", anchor, %kind, "anchor_missing_new_end");
            return LineChange::empty();
        };
        let Some(buffer) = buffer else {
            debug!(target: "tracker.query", anchor, "query_view_unavailable");
            return LineChange::empty();
        };
        if change.old_range.is_none() {
            change.old_range = index.inserted_old_range(anchor);
        }
        change.new_lines = split_lines(&buffer.line_range_text(anchor..end), false);
        change.new_ends_with_eol = end == anchor
            || buffer.line(end - 1).is_none_or(|l| has_eol(&l));
        change.new_range = Some(anchor..end);
    }
    change
}
