//! Plain-text rendering of the change margin.

use core_text::Buffer;
use core_tracker::{ChangeKind, MarkerModel};
use std::fmt::Write as _;

pub fn marker(kind: Option<ChangeKind>) -> char {
    match kind {
        Some(ChangeKind::Insert) => '+',
        Some(ChangeKind::Replace) => '~',
        Some(ChangeKind::Delete) => '_',
        None => ' ',
    }
}

/// One row per buffer line: marker, one-based line number, text.
pub fn render(buffer: &Buffer, model: &MarkerModel) -> String {
    let lines = buffer.lines(false);
    let width = lines.len().max(1).to_string().len();
    let mut out = String::new();
    for (idx, text) in lines.iter().enumerate() {
        let _ = writeln!(
            out,
            "{} {:>width$} {}",
            marker(model.active_kind(idx)),
            idx + 1,
            text
        );
    }
    // A delete anchored past the last line still gets a row.
    if let Some(kind) = model.active_kind(lines.len()) {
        let _ = writeln!(out, "{} {:>width$}", marker(Some(kind)), lines.len() + 1);
    }
    out
}
