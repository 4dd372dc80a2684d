//! Line segmentation helpers.
//!
//! Contract:
//! - `split_lines` recognizes `\n`, `\r\n` and a lone `\r` as terminators, the
//!   same set the rope in [`crate::Buffer`] breaks lines on. An empty input yields
//!   no lines and a trailing terminator does not open an empty line.
//! - Text passes through byte for byte; nothing is normalized.

/// Split `text` into lines, keeping each terminator when `keep_eol` is set.
pub fn split_lines(text: &str, keep_eol: bool) -> Vec<String> {
    let mut out = Vec::new();
    let bytes = text.as_bytes();
    let mut start = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        let term_len = match bytes[i] {
            b'\n' => 1,
            b'\r' if bytes.get(i + 1) == Some(&b'\n') => 2,
            b'\r' => 1,
            _ => {
                i += 1;
                continue;
            }
        };
        let end = if keep_eol { i + term_len } else { i };
        out.push(text[start..end].to_string());
        i += term_len;
        start = i;
    }
    if start < bytes.len() {
        out.push(text[start..].to_string());
    }
    out
}

/// Strip a single trailing line terminator (`\n`, `\r\n` or `\r`).
pub fn strip_eol(line: &str) -> &str {
    line.strip_suffix('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .or_else(|| line.strip_suffix('\r'))
        .unwrap_or(line)
}

/// True when `line` ends with a line terminator.
pub fn has_eol(line: &str) -> bool {
    line.ends_with('\n') || line.ends_with('\r')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_matches_splitlines_semantics() {
        assert!(split_lines("", true).is_empty());
        assert_eq!(split_lines("a", false), vec!["a"]);
        assert_eq!(split_lines("a\nb\n", false), vec!["a", "b"]);
        assert_eq!(split_lines("a\nb\n", true), vec!["a\n", "b\n"]);
        assert_eq!(split_lines("\n\n", false), vec!["", ""]);
    }

    #[test]
    fn split_handles_crlf_and_lone_cr() {
        assert_eq!(split_lines("a\r\nb\rc", true), vec!["a\r\n", "b\r", "c"]);
        assert_eq!(split_lines("a\r\nb\rc", false), vec!["a", "b", "c"]);
    }

    #[test]
    fn strip_eol_variants() {
        assert_eq!(strip_eol("x\r\n"), "x");
        assert_eq!(strip_eol("x\n"), "x");
        assert_eq!(strip_eol("x\r"), "x");
        assert_eq!(strip_eol("x"), "x");
        assert!(has_eol("x\r"));
        assert!(!has_eol("x"));
    }

    #[test]
    fn form_feed_and_decomposed_text_are_not_line_breaks() {
        assert_eq!(split_lines("\x0c\nold\n", true), vec!["\x0c\n", "old\n"]);
        assert_eq!(split_lines("a\x0bb\u{2028}c\n", false), vec!["a\x0bb\u{2028}c"]);
        assert_eq!(split_lines("e\u{0301}\n", false), vec!["e\u{0301}"]);
    }
}
