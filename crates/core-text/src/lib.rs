//! Rope-based text buffer abstraction.
//!
//! Line numbering follows editor semantics: a buffer ending in a newline has a
//! final empty line, so `"a\nb\n"` reports three lines. Diff inputs are produced
//! with [`split_lines`] instead, which never yields that trailing empty line.
//! Both break lines on `\n`, `\r\n` and `\r` only; ropey is built without its
//! `unicode_lines` feature so form feeds and U+2028 stay inside a line.

use anyhow::Result;
use ropey::Rope;
use std::ops::Range;

pub mod segment;

pub use segment::{has_eol, split_lines, strip_eol};

/// A text buffer backed by a `ropey::Rope`.
#[derive(Clone)]
pub struct Buffer {
    rope: Rope,
    pub name: String,
}

impl Buffer {
    /// Construct a buffer from an in-memory string slice.
    pub fn from_str(name: impl Into<String>, content: &str) -> Result<Self> {
        Ok(Self {
            rope: Rope::from_str(content),
            name: name.into(),
        })
    }

    /// Total number of lines in the buffer.
    pub fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    /// Return the requested line as an owned `String` (including trailing newline if present).
    pub fn line(&self, idx: usize) -> Option<String> {
        if idx < self.rope.len_lines() {
            Some(self.rope.line(idx).to_string())
        } else {
            None
        }
    }

    /// Full buffer contents.
    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    /// Byte length of the whole buffer.
    pub fn len_bytes(&self) -> usize {
        self.rope.len_bytes()
    }

    /// Split the buffer into lines, optionally retaining each line terminator.
    pub fn lines(&self, keep_eol: bool) -> Vec<String> {
        split_lines(&self.text(), keep_eol)
    }

    /// True when the final character is a line terminator.
    pub fn ends_with_newline(&self) -> bool {
        let len = self.rope.len_chars();
        len > 0 && matches!(self.rope.char(len - 1), '\n' | '\r')
    }

    /// Line terminator used by the buffer, detected from the first line break.
    /// Defaults to `"\n"` for single-line buffers.
    pub fn eol(&self) -> &'static str {
        let mut prev_cr = false;
        for ch in self.rope.chars() {
            match ch {
                '\n' if prev_cr => return "\r\n",
                '\n' => return "\n",
                '\r' => prev_cr = true,
                _ if prev_cr => return "\r",
                _ => {}
            }
        }
        if prev_cr { "\r" } else { "\n" }
    }

    /// Text spanning lines `[range.start, range.end)`: from the start of the first
    /// line to the end of the last line, excluding the last line's terminator.
    /// Empty or out-of-range spans yield an empty string.
    pub fn line_range_text(&self, range: Range<usize>) -> String {
        let lines = self.rope.len_lines();
        if range.start >= range.end || range.start >= lines {
            return String::new();
        }
        let last = range.end.min(lines) - 1;
        let start_char = self.rope.line_to_char(range.start);
        let end_char = self.line_content_end_char(last);
        if start_char >= end_char {
            return String::new();
        }
        self.rope.slice(start_char..end_char).to_string()
    }

    /// Replace whole lines `[range.start, range.end)` (terminators included) with `text`.
    /// `range.end` is clamped to the buffer; an empty range inserts before `range.start`.
    pub fn replace_lines(&mut self, range: Range<usize>, text: &str) {
        let lines = self.rope.len_lines();
        let start_line = range.start.min(lines);
        let start_char = if start_line >= lines {
            self.rope.len_chars()
        } else {
            self.rope.line_to_char(start_line)
        };
        let end_char = if range.end >= lines {
            self.rope.len_chars()
        } else {
            self.rope.line_to_char(range.end.max(start_line))
        };
        if start_char < end_char {
            self.rope.remove(start_char..end_char);
        }
        if !text.is_empty() {
            self.rope.insert(start_char, text);
        }
    }

    fn line_content_end_char(&self, idx: usize) -> usize {
        let start = self.rope.line_to_char(idx);
        let line = self.rope.line(idx);
        let mut len = line.len_chars();
        if len > 0 && line.char(len - 1) == '\n' {
            len -= 1;
        }
        if len > 0 && line.char(len - 1) == '\r' {
            len -= 1;
        }
        start + len
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("name", &self.name)
            .field("lines", &self.line_count())
            .field("bytes", &self.len_bytes())
            .finish()
    }
}
