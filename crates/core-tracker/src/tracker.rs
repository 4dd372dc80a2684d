//! Tracker state and update dispatch.
//!
//! Shared state lives in `TrackerInner` behind an `Arc`; background producers
//! (disk workers, scc callbacks, queued rebuild jobs) only ever hold a `Weak`
//! to it so a dropped tracker is never kept alive by in-flight work.
//!
//! Locking: `state` (reference + index) is written only by rebuild jobs on the
//! delivery thread and read by `query`/`summary`. The two pending slots are
//! separate mutexes and are never held across a call into a collaborator.

use crate::document::{Document, DocumentKind};
use crate::error::TrackerError;
use crate::query::{self, ChangeKind, LineChange, QueryMemory};
use crate::snapshot::ReferenceSnapshot;
use crate::vcs::{CatHandle, VcsRegistry};
use crate::{TrackerSettings, disk, scc};
use core_events::{HandlerRef, Notification, NotificationSink};
use core_index::{ChangeIndex, ChangeSummary, DiffEngine, DiffOpcode, SimilarDiff};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub(crate) struct IndexedState {
    pub(crate) reference: ReferenceSnapshot,
    pub(crate) index: ChangeIndex,
}

pub(crate) struct DiskRequest {
    pub(crate) ticket: u64,
    pub(crate) started_at: Instant,
}

pub(crate) struct SccRequest {
    pub(crate) ticket: u64,
    pub(crate) started_at: Instant,
    pub(crate) stale: bool,
    pub(crate) handler: HandlerRef,
    /// Attached once `cat` returns; `None` while the call is still being made.
    pub(crate) handle: Option<Box<dyn CatHandle>>,
}

/// Fetch counters (relaxed atomics).
#[derive(Debug, Default)]
pub(crate) struct FetchMetrics {
    pub(crate) disk_workers_spawned: AtomicU64,
    pub(crate) disk_coalesced: AtomicU64,
    pub(crate) scc_requests_issued: AtomicU64,
    pub(crate) scc_stale_marks: AtomicU64,
    pub(crate) scc_reissues: AtomicU64,
    pub(crate) timeouts: AtomicU64,
    pub(crate) late_results_discarded: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchMetricsSnapshot {
    pub disk_workers_spawned: u64,
    pub disk_coalesced: u64,
    pub scc_requests_issued: u64,
    pub scc_stale_marks: u64,
    pub scc_reissues: u64,
    pub timeouts: u64,
    pub late_results_discarded: u64,
}

impl FetchMetrics {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> FetchMetricsSnapshot {
        use Ordering::Relaxed;
        FetchMetricsSnapshot {
            disk_workers_spawned: self.disk_workers_spawned.load(Relaxed),
            disk_coalesced: self.disk_coalesced.load(Relaxed),
            scc_requests_issued: self.scc_requests_issued.load(Relaxed),
            scc_stale_marks: self.scc_stale_marks.load(Relaxed),
            scc_reissues: self.scc_reissues.load(Relaxed),
            timeouts: self.timeouts.load(Relaxed),
            late_results_discarded: self.late_results_discarded.load(Relaxed),
        }
    }
}

pub(crate) struct TrackerInner {
    pub(crate) document: Weak<dyn Document>,
    pub(crate) sink: NotificationSink,
    pub(crate) settings: TrackerSettings,
    pub(crate) engine: Arc<dyn DiffEngine>,
    pub(crate) vcs: VcsRegistry,
    pub(crate) state: RwLock<IndexedState>,
    pub(crate) disk: Mutex<Option<DiskRequest>>,
    pub(crate) scc: Mutex<Option<SccRequest>>,
    pub(crate) metrics: FetchMetrics,
    memory: Mutex<QueryMemory>,
    collab_reference: Mutex<Option<ReferenceSnapshot>>,
    next_ticket: AtomicU64,
}

impl TrackerInner {
    pub(crate) fn document(&self) -> Result<Arc<dyn Document>, TrackerError> {
        self.document.upgrade().ok_or(TrackerError::ReferenceExpired)
    }

    pub(crate) fn next_ticket(&self) -> u64 {
        self.next_ticket.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Route a failure to the handler, or log it when it ends the update quietly.
    pub(crate) fn report(&self, handler: &HandlerRef, err: TrackerError) {
        if err.is_quiet() {
            info!(target: "tracker.index", error = %err, "update_aborted");
        } else {
            self.sink.notify_error(handler, err.to_string());
        }
    }

    /// Diff `reference` against the current buffer and queue the rebuild. The
    /// buffer is split keeping terminators only when the reference kept them.
    pub(crate) fn notify_file_changes(
        self: &Arc<Self>,
        handler: &HandlerRef,
        reference: ReferenceSnapshot,
    ) -> Result<(), TrackerError> {
        let doc = self.document()?;
        let buffer = doc.buffer().ok_or(TrackerError::ViewUnavailable)?;
        let current = buffer.lines(reference.first_line_has_eol());
        let opcodes = self.engine.opcodes(reference.lines(), &current);
        debug!(
            target: "tracker.index",
            reference_lines = reference.len(),
            current_lines = current.len(),
            opcodes = opcodes.len(),
            "opcodes_computed"
        );
        self.submit_rebuild(handler, opcodes, buffer.line_count(), Some(reference));
        Ok(())
    }

    /// Queue a rebuild on the delivery thread. Index swap, snapshot swap and
    /// summary happen there as one step under the state write lock.
    pub(crate) fn submit_rebuild(
        self: &Arc<Self>,
        handler: &HandlerRef,
        opcodes: Vec<DiffOpcode>,
        line_count: usize,
        reference: Option<ReferenceSnapshot>,
    ) {
        let weak = Arc::downgrade(self);
        self.sink.submit(handler, move || {
            let inner = weak.upgrade()?;
            inner.apply_rebuild(&opcodes, line_count, reference)
        });
    }

    fn apply_rebuild(
        &self,
        opcodes: &[DiffOpcode],
        line_count: usize,
        reference: Option<ReferenceSnapshot>,
    ) -> Option<Notification> {
        let mut state = self.state.write();
        match state.index.rebuild(opcodes, line_count) {
            Ok(summary) => {
                if let Some(reference) = reference {
                    state.reference = reference;
                }
                Some(Notification::Changes(summary))
            }
            Err(e) => Some(Notification::Error(TrackerError::from(e).to_string())),
        }
    }

    fn stop_pending(&self) {
        let scc = self.scc.lock().take();
        if let Some(handle) = scc.and_then(|req| req.handle) {
            handle.stop();
        }
        self.disk.lock().take();
    }
}

impl Drop for TrackerInner {
    fn drop(&mut self) {
        if let Some(handle) = self.scc.get_mut().take().and_then(|req| req.handle) {
            handle.stop();
        }
    }
}

pub struct TrackerBuilder {
    document: Weak<dyn Document>,
    sink: NotificationSink,
    settings: TrackerSettings,
    engine: Arc<dyn DiffEngine>,
    vcs: VcsRegistry,
}

impl TrackerBuilder {
    pub fn settings(mut self, settings: TrackerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn engine(mut self, engine: Arc<dyn DiffEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn vcs(mut self, vcs: VcsRegistry) -> Self {
        self.vcs = vcs;
        self
    }

    pub fn build(self) -> ChangeTracker {
        ChangeTracker {
            inner: Arc::new(TrackerInner {
                document: self.document,
                sink: self.sink,
                settings: self.settings,
                engine: self.engine,
                vcs: self.vcs,
                state: RwLock::new(IndexedState::default()),
                disk: Mutex::new(None),
                scc: Mutex::new(None),
                metrics: FetchMetrics::default(),
                memory: Mutex::new(QueryMemory::default()),
                collab_reference: Mutex::new(None),
                next_ticket: AtomicU64::new(0),
            }),
        }
    }
}

/// Handle to one document's tracking state. Clones share the same state.
#[derive(Clone)]
pub struct ChangeTracker {
    inner: Arc<TrackerInner>,
}

impl ChangeTracker {
    pub fn builder(document: Weak<dyn Document>, sink: NotificationSink) -> TrackerBuilder {
        TrackerBuilder {
            document,
            sink,
            settings: TrackerSettings::default(),
            engine: Arc::new(SimilarDiff::default()),
            vcs: VcsRegistry::with_git(),
        }
    }

    pub fn settings(&self) -> TrackerSettings {
        self.inner.settings
    }

    /// Refresh the reference and deliver the resulting changes to `handler`.
    pub fn update(&self, handler: &HandlerRef) {
        self.update_at(handler, Instant::now());
    }

    /// `update` with an explicit clock reading for the timeout checks.
    pub fn update_at(&self, handler: &HandlerRef, now: Instant) {
        if !self.inner.settings.enabled {
            debug!(target: "tracker.index", "update_skipped_disabled");
            return;
        }
        let outcome = self.inner.document().and_then(|doc| match doc.kind() {
            DocumentKind::FileBacked(file) if file.scc_type.is_some() => {
                scc::request(&self.inner, handler, now)
            }
            DocumentKind::FileBacked(_) => disk::request(&self.inner, handler, now),
            DocumentKind::Collaborative => {
                info!(target: "tracker.index", "update_collaborative");
                let reference = self.inner.collab_reference.lock().clone().unwrap_or_default();
                self.inner.notify_file_changes(handler, reference)
            }
            DocumentKind::Scratch => {
                info!(target: "tracker.index", "update_skipped_no_source");
                Ok(())
            }
        });
        if let Err(e) = outcome {
            self.inner.report(handler, e);
        }
    }

    /// Force the on-disk source regardless of version-control metadata.
    pub fn request_disk(&self, handler: &HandlerRef, now: Instant) {
        if let Err(e) = disk::request(&self.inner, handler, now) {
            self.inner.report(handler, e);
        }
    }

    /// Force the version-control source.
    pub fn request_scc(&self, handler: &HandlerRef, now: Instant) {
        if let Err(e) = scc::request(&self.inner, handler, now) {
            self.inner.report(handler, e);
        }
    }

    /// Capture the current buffer as the reference of a collaborative document.
    pub fn store_collab_state(&self) {
        let Ok(doc) = self.inner.document() else {
            return;
        };
        if doc.kind() != DocumentKind::Collaborative {
            return;
        }
        let Some(buffer) = doc.buffer() else {
            warn!(target: "tracker.index", "collab_state_view_unavailable");
            return;
        };
        let snapshot = ReferenceSnapshot::from_text(&buffer.text(), true);
        debug!(target: "tracker.index", lines = snapshot.len(), "collab_state_stored");
        *self.inner.collab_reference.lock() = Some(snapshot);
    }

    /// What changed at `line`. Omitted arguments reuse the previous call's values.
    pub fn query(&self, line: Option<usize>, kind: Option<ChangeKind>) -> LineChange {
        let (line, kind) = self.inner.memory.lock().resolve(line, kind);
        let (Some(line), Some(kind)) = (line, kind) else {
            return LineChange::empty();
        };
        let buffer = match self.inner.document() {
            Ok(doc) => doc.buffer(),
            Err(e) => {
                debug!(target: "tracker.query", error = %e, "query_document_gone");
                None
            }
        };
        let state = self.inner.state.read();
        query::resolve(&state, buffer.as_ref(), line, kind)
    }

    pub fn summary(&self) -> ChangeSummary {
        self.inner.state.read().index.summary()
    }

    pub fn index(&self) -> ChangeIndex {
        self.inner.state.read().index.clone()
    }

    pub fn reference(&self) -> ReferenceSnapshot {
        self.inner.state.read().reference.clone()
    }

    pub fn is_disk_pending(&self) -> bool {
        self.inner.disk.lock().is_some()
    }

    pub fn is_scc_pending(&self) -> bool {
        self.inner.scc.lock().is_some()
    }

    pub fn metrics(&self) -> FetchMetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Stop any pending fetch and drop the tracking data.
    pub fn finalize(&self) {
        self.inner.stop_pending();
        *self.inner.state.write() = IndexedState::default();
        self.inner.collab_reference.lock().take();
        debug!(target: "tracker.index", "tracker_finalized");
    }
}
