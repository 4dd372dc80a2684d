//! On-disk reference source.
//!
//! One worker at a time. A request arriving while a worker is pending is
//! coalesced into it; unlike the scc path no follow-up run is scheduled. Once
//! the pending request is older than the timeout the next request reports the
//! timeout and frees the slot. The overrunning worker keeps going and its
//! result is dropped when it finds its ticket no longer pending.

use crate::DISK_WORKER_THREAD_NAME;
use crate::document::Document;
use crate::error::{SourceKind, TrackerError};
use crate::snapshot::ReferenceSnapshot;
use crate::tracker::{DiskRequest, FetchMetrics, TrackerInner};
use core_events::HandlerRef;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Instant;
use tracing::{debug, info};

pub(crate) fn request(
    inner: &Arc<TrackerInner>,
    handler: &HandlerRef,
    now: Instant,
) -> Result<(), TrackerError> {
    let doc = inner.document()?;
    if !doc.is_dirty() {
        debug!(target: "tracker.disk", "document_not_dirty");
        inner.submit_rebuild(handler, Vec::new(), 0, None);
        return Ok(());
    }

    let mut slot = inner.disk.lock();
    if let Some(pending) = slot.as_ref() {
        let timeout = inner.settings.request_timeout;
        let elapsed = now.saturating_duration_since(pending.started_at);
        if elapsed < timeout {
            FetchMetrics::incr(&inner.metrics.disk_coalesced);
            debug!(target: "tracker.disk", ticket = pending.ticket, ?elapsed, "disk_request_coalesced");
            return Ok(());
        }
        info!(target: "tracker.disk", ticket = pending.ticket, ?elapsed, "disk_request_expired");
        *slot = None;
        FetchMetrics::incr(&inner.metrics.timeouts);
        return Err(TrackerError::FetchTimeout {
            source_kind: SourceKind::Disk,
            timeout,
        });
    }

    let ticket = inner.next_ticket();
    let worker_inner = Arc::downgrade(inner);
    let document = inner.document.clone();
    let worker_handler = handler.clone();
    let spawned = thread::Builder::new()
        .name(DISK_WORKER_THREAD_NAME.to_string())
        .spawn(move || run_worker(worker_inner, document, worker_handler, ticket));
    if let Err(e) = spawned {
        return Err(TrackerError::SourceUnavailable(format!(
            "could not start on-disk reader: {e}"
        )));
    }
    *slot = Some(DiskRequest {
        ticket,
        started_at: now,
    });
    FetchMetrics::incr(&inner.metrics.disk_workers_spawned);
    debug!(target: "tracker.disk", ticket, "disk_worker_spawned");
    Ok(())
}

fn run_worker(
    inner: Weak<TrackerInner>,
    document: Weak<dyn Document>,
    handler: HandlerRef,
    ticket: u64,
) {
    let read = document.upgrade().map(|doc| doc.read_on_disk());
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let owned = finish(&inner, ticket);
    let Some(read) = read else {
        debug!(target: "tracker.disk", ticket, "disk_worker_document_gone");
        return;
    };
    if !owned {
        FetchMetrics::incr(&inner.metrics.late_results_discarded);
        info!(target: "tracker.disk", ticket, "disk_result_discarded");
        return;
    }
    let outcome = match read {
        Ok(bytes) => {
            debug!(target: "tracker.disk", ticket, bytes = bytes.len(), "disk_contents_read");
            let reference = ReferenceSnapshot::from_bytes(&bytes, true, SourceKind::Disk);
            inner.notify_file_changes(&handler, reference)
        }
        Err(e) => Err(TrackerError::SourceError {
            source_kind: SourceKind::Disk,
            message: e.to_string(),
        }),
    };
    if let Err(e) = outcome {
        inner.report(&handler, e);
    }
}

/// Clear the pending slot if it still belongs to `ticket`.
fn finish(inner: &TrackerInner, ticket: u64) -> bool {
    let mut slot = inner.disk.lock();
    match slot.as_ref() {
        Some(pending) if pending.ticket == ticket => {
            *slot = None;
            true
        }
        _ => false,
    }
}
