//! Hunk presentation and revert for a queried [`LineChange`].

use crate::query::LineChange;
use core_text::Buffer;
use std::fmt::Write as _;
use std::ops::Range;

const NO_NEWLINE: &str = "\\ No newline at end of file";

/// `@@ -<i1+1>,<i2+1> +<j1+1>,<j2+1> @@`. Both ends are shown one-based.
pub fn header(old_range: &Range<usize>, new_range: &Range<usize>) -> String {
    format!(
        "@@ -{},{} +{},{} @@",
        old_range.start + 1,
        old_range.end + 1,
        new_range.start + 1,
        new_range.end + 1
    )
}

/// Render `change` as a header followed by `-`/`+` lines. Empty changes render
/// as an empty string.
pub fn to_unified(change: &LineChange) -> String {
    let (Some(old_range), Some(new_range)) = (&change.old_range, &change.new_range) else {
        return String::new();
    };
    let mut out = header(old_range, new_range);
    out.push('\n');
    for line in &change.old_lines {
        let _ = writeln!(out, "-{line}");
    }
    if !change.old_lines.is_empty() && !change.old_ends_with_eol {
        let _ = writeln!(out, "{NO_NEWLINE}");
    }
    for line in &change.new_lines {
        let _ = writeln!(out, "+{line}");
    }
    if !change.new_lines.is_empty() && !change.new_ends_with_eol {
        let _ = writeln!(out, "{NO_NEWLINE}");
    }
    out
}

/// Put the old side of `change` back into `buffer` in place of its new side.
/// Old lines are joined with the buffer's own terminator. Returns false for an
/// empty change.
pub fn revert(buffer: &mut Buffer, change: &LineChange) -> bool {
    let (Some(old_range), Some(new_range)) = (&change.old_range, &change.new_range) else {
        return false;
    };
    let eol = buffer.eol();
    let mut text = String::new();
    if !old_range.is_empty() {
        // Appending past an unterminated last line needs a break first.
        let past_end = new_range.start >= buffer.line_count();
        if past_end && buffer.len_bytes() > 0 && !buffer.ends_with_newline() {
            text.push_str(eol);
        }
        text.push_str(&change.old_lines.join(eol));
        if change.old_ends_with_eol {
            text.push_str(eol);
        }
    }
    buffer.replace_lines(new_range.clone(), &text);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ChangeKind;
    use pretty_assertions::assert_eq;

    fn change(
        kind: ChangeKind,
        old_range: Range<usize>,
        new_range: Range<usize>,
        old: &[&str],
        new: &[&str],
    ) -> LineChange {
        LineChange {
            kind: Some(kind),
            old_ends_with_eol: true,
            new_ends_with_eol: true,
            old_range: Some(old_range),
            new_range: Some(new_range),
            old_lines: old.iter().map(|s| s.to_string()).collect(),
            new_lines: new.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn unified_rendering() {
        let mut c = change(ChangeKind::Replace, 1..2, 1..3, &["b"], &["x", "y"]);
        c.new_ends_with_eol = false;
        assert_eq!(
            to_unified(&c),
            "@@ -2,3 +2,4 @@\n-b\n+x\n+y\n\\ No newline at end of file\n"
        );
        assert_eq!(to_unified(&LineChange::empty()), "");
    }

    #[test]
    fn revert_replace() {
        let mut buf = Buffer::from_str("t", "a\nx\ny\nc\n").unwrap();
        let c = change(ChangeKind::Replace, 1..2, 1..3, &["b"], &["x", "y"]);
        assert!(revert(&mut buf, &c));
        assert_eq!(buf.text(), "a\nb\nc\n");
    }

    #[test]
    fn revert_insert_removes_block() {
        let mut buf = Buffer::from_str("t", "a\nnew\nb\n").unwrap();
        let c = change(ChangeKind::Insert, 1..1, 1..2, &[], &["new"]);
        assert!(revert(&mut buf, &c));
        assert_eq!(buf.text(), "a\nb\n");
    }

    #[test]
    fn revert_delete_uses_buffer_eol() {
        let mut buf = Buffer::from_str("t", "a\r\nc\r\n").unwrap();
        let c = change(ChangeKind::Delete, 1..2, 1..1, &["b"], &[]);
        assert!(revert(&mut buf, &c));
        assert_eq!(buf.text(), "a\r\nb\r\nc\r\n");
    }

    #[test]
    fn revert_trailing_delete_after_unterminated_line() {
        let mut buf = Buffer::from_str("t", "a\nb").unwrap();
        let c = change(ChangeKind::Delete, 2..4, 2..2, &["c", "d"], &[]);
        assert!(revert(&mut buf, &c));
        assert_eq!(buf.text(), "a\nb\nc\nd\n");
    }

    #[test]
    fn revert_empty_is_noop() {
        let mut buf = Buffer::from_str("t", "a\n").unwrap();
        assert!(!revert(&mut buf, &LineChange::empty()));
        assert_eq!(buf.text(), "a\n");
    }
}
