//! Consumer-side marker state for a change margin.
//!
//! [`MarkerModel`] turns each delivered summary into per-line markers and
//! reports which markers expired and which are new relative to the previous
//! delivery, so a renderer only repaints what moved. [`MarginHandler`] is a
//! ready-made [`ChangeHandler`] around it.

use crate::query::ChangeKind;
use core_events::ChangeHandler;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MarkerModel {
    deletions: BTreeSet<usize>,
    insertions: BTreeSet<usize>,
    modifications: BTreeSet<usize>,
}

/// Difference between two consecutive marker sets.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MarkerDelta {
    /// Lines whose previous marker must be cleared.
    pub expired: BTreeSet<usize>,
    /// Markers to paint, in kind order then line order.
    pub added: Vec<(usize, ChangeKind)>,
}

fn expand(pairs: &[usize]) -> BTreeSet<usize> {
    pairs.chunks_exact(2).flat_map(|p| p[0]..p[1]).collect()
}

impl MarkerModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the markers with a new delivery.
    pub fn apply(&mut self, deleted: &[usize], inserted: &[usize], modified: &[usize]) -> MarkerDelta {
        let next = MarkerModel {
            deletions: deleted.iter().copied().collect(),
            insertions: expand(inserted),
            modifications: expand(modified),
        };
        let mut delta = MarkerDelta::default();
        for (prev, curr, kind) in [
            (&self.deletions, &next.deletions, ChangeKind::Delete),
            (&self.insertions, &next.insertions, ChangeKind::Insert),
            (&self.modifications, &next.modifications, ChangeKind::Replace),
        ] {
            delta.expired.extend(prev.difference(curr));
            delta
                .added
                .extend(curr.difference(prev).map(|&line| (line, kind)));
        }
        *self = next;
        delta
    }

    pub fn clear(&mut self) -> BTreeSet<usize> {
        let lines = self.marked_lines();
        *self = Self::default();
        lines
    }

    pub fn is_empty(&self) -> bool {
        self.deletions.is_empty() && self.insertions.is_empty() && self.modifications.is_empty()
    }

    /// Marker shown at `line`. A deletion wins over an insertion, which wins
    /// over a replacement.
    pub fn active_kind(&self, line: usize) -> Option<ChangeKind> {
        if self.deletions.contains(&line) {
            Some(ChangeKind::Delete)
        } else if self.insertions.contains(&line) {
            Some(ChangeKind::Insert)
        } else if self.modifications.contains(&line) {
            Some(ChangeKind::Replace)
        } else {
            None
        }
    }

    pub fn marked_lines(&self) -> BTreeSet<usize> {
        self.deletions
            .iter()
            .chain(&self.insertions)
            .chain(&self.modifications)
            .copied()
            .collect()
    }

    /// First line of every run of lines carrying the same marker kind.
    pub fn change_starts(&self) -> BTreeSet<usize> {
        self.marked_lines()
            .into_iter()
            .filter(|&line| {
                line == 0 || self.active_kind(line - 1) != self.active_kind(line)
            })
            .collect()
    }

    /// Start of the next change block after `line`, wrapping to the first.
    pub fn next_change(&self, line: usize) -> Option<usize> {
        let starts = self.change_starts();
        starts
            .range(line + 1..)
            .next()
            .or_else(|| starts.iter().next())
            .copied()
    }

    /// Start of the change block before the one containing `line`, wrapping to the last.
    pub fn previous_change(&self, line: usize) -> Option<usize> {
        let starts = self.change_starts();
        let current = starts.range(..=line).next_back().copied();
        let before = match current {
            Some(start) if self.active_kind(line).is_some() => start,
            _ => line + 1,
        };
        starts
            .range(..before)
            .next_back()
            .or_else(|| starts.iter().next_back())
            .copied()
    }
}

/// [`ChangeHandler`] that keeps a [`MarkerModel`] current and signals each delivery.
pub struct MarginHandler {
    model: Mutex<MarkerModel>,
    last_delta: Mutex<MarkerDelta>,
    last_error: Mutex<Option<String>>,
    updates: Sender<()>,
    updated: Receiver<()>,
}

impl Default for MarginHandler {
    fn default() -> Self {
        let (updates, updated) = crossbeam_channel::unbounded();
        Self {
            model: Mutex::new(MarkerModel::default()),
            last_delta: Mutex::new(MarkerDelta::default()),
            last_error: Mutex::new(None),
            updates,
            updated,
        }
    }
}

impl MarginHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(&self) -> MarkerModel {
        self.model.lock().clone()
    }

    pub fn last_delta(&self) -> MarkerDelta {
        self.last_delta.lock().clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    /// Wait for the next delivery (change or error). False on timeout.
    pub fn wait_for_update(&self, timeout: Duration) -> bool {
        self.updated.recv_timeout(timeout).is_ok()
    }

    fn signal(&self) {
        if self.updates.send(()).is_err() {
            warn!(target: "delivery", "margin_signal_dropped");
        }
    }
}

impl ChangeHandler for MarginHandler {
    fn on_error(&self, message: &str) {
        *self.last_error.lock() = Some(message.to_string());
        self.signal();
    }

    fn mark_changes(
        &self,
        deleted: &[usize],
        inserted: &[usize],
        modified: &[usize],
    ) -> anyhow::Result<()> {
        if inserted.len() % 2 != 0 || modified.len() % 2 != 0 {
            anyhow::bail!("range lists must hold (anchor, end) pairs");
        }
        let delta = self.model.lock().apply(deleted, inserted, modified);
        debug!(
            target: "delivery",
            expired = delta.expired.len(),
            added = delta.added.len(),
            "margin_updated"
        );
        *self.last_delta.lock() = delta;
        *self.last_error.lock() = None;
        self.signal();
        Ok(())
    }
}
