//! Reference snapshot: the line sequence the current buffer is diffed against.

use crate::error::{SourceKind, TrackerError};
use core_text::{has_eol, split_lines, strip_eol};
use std::ops::Range;
use tracing::warn;

/// Lines captured at the last successful fetch. Immutable; replaced wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSnapshot {
    lines: Vec<String>,
    /// Whether the captured text ended with a terminator (or was empty).
    ends_with_eol: bool,
}

impl Default for ReferenceSnapshot {
    fn default() -> Self {
        Self::from_text("", false)
    }
}

impl ReferenceSnapshot {
    pub fn from_text(text: &str, keep_eol: bool) -> Self {
        Self {
            lines: split_lines(text, keep_eol),
            ends_with_eol: text.is_empty() || has_eol(text),
        }
    }

    /// Decode fetched bytes as UTF-8. Invalid input is logged and decoded lossily
    /// so a stray byte never blocks tracking.
    pub fn from_bytes(bytes: &[u8], keep_eol: bool, source_kind: SourceKind) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(text) => Self::from_text(text, keep_eol),
            Err(e) => {
                let err = TrackerError::EncodingFailure {
                    source_kind,
                    valid_up_to: e.valid_up_to(),
                };
                warn!(target: "tracker.snapshot", error = %err, bytes = bytes.len(), "reference_decode_lossy");
                Self::from_text(&String::from_utf8_lossy(bytes), keep_eol)
            }
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Whether the first line kept its terminator. Decides how the current
    /// buffer is split so both diff inputs agree.
    pub fn first_line_has_eol(&self) -> bool {
        self.lines.first().is_some_and(|l| has_eol(l))
    }

    /// Lines in `range` with terminators stripped. Out-of-range parts are dropped.
    pub fn slice_stripped(&self, range: Range<usize>) -> Vec<String> {
        let end = range.end.min(self.lines.len());
        let start = range.start.min(end);
        self.lines[start..end]
            .iter()
            .map(|l| strip_eol(l).to_string())
            .collect()
    }

    pub fn ends_with_eol(&self) -> bool {
        self.ends_with_eol
    }

    /// Whether the last line of `range` is followed by a terminator. Only a range
    /// reaching the end of a text without a trailing newline answers false.
    pub fn range_ends_with_eol(&self, range: Range<usize>) -> bool {
        range.is_empty() || range.end < self.lines.len() || self.ends_with_eol
    }
}
