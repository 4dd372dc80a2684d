//! Version-control reference source.
//!
//! At most one `cat` in flight. A request that arrives while one is pending
//! marks it stale instead of issuing another; when the pending one completes
//! successfully a single fresh request follows after a short pause. Timeouts
//! stop the external request and free the slot. Callbacks are matched to the
//! pending request by ticket, so duplicates and late arrivals are ignored.

use crate::document::DocumentKind;
use crate::error::{SourceKind, TrackerError};
use crate::snapshot::ReferenceSnapshot;
use crate::tracker::{FetchMetrics, SccRequest, TrackerInner};
use core_events::HandlerRef;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info};

pub(crate) fn request(
    inner: &Arc<TrackerInner>,
    handler: &HandlerRef,
    now: Instant,
) -> Result<(), TrackerError> {
    {
        let mut slot = inner.scc.lock();
        if let Some(pending) = slot.as_mut() {
            pending.stale = true;
            FetchMetrics::incr(&inner.metrics.scc_stale_marks);
            let timeout = inner.settings.request_timeout;
            let elapsed = now.saturating_duration_since(pending.started_at);
            if elapsed < timeout {
                debug!(target: "tracker.scc", ticket = pending.ticket, ?elapsed, "scc_request_marked_stale");
                return Ok(());
            }
            info!(target: "tracker.scc", ticket = pending.ticket, ?elapsed, "scc_request_expired");
            let expired = slot.take();
            drop(slot);
            if let Some(handle) = expired.and_then(|req| req.handle) {
                handle.stop();
            }
            FetchMetrics::incr(&inner.metrics.timeouts);
            return Err(TrackerError::FetchTimeout {
                source_kind: SourceKind::Scc,
                timeout,
            });
        }
    }

    let doc = inner.document()?;
    let DocumentKind::FileBacked(file) = doc.kind() else {
        return Err(TrackerError::SourceUnavailable(format!(
            "{} does not have a valid file",
            doc.display_name()
        )));
    };
    let Some(scc_type) = file.scc_type.as_deref() else {
        return Err(TrackerError::SourceUnavailable(format!(
            "{} is no longer under version control",
            doc.display_name()
        )));
    };
    let Some(service) = inner.vcs.get(scc_type) else {
        return Err(TrackerError::SourceUnavailable(format!(
            "no version-control service registered for {scc_type}"
        )));
    };

    let ticket = inner.next_ticket();
    {
        let mut slot = inner.scc.lock();
        if let Some(pending) = slot.as_mut() {
            // Another caller issued while we validated; fold into theirs.
            pending.stale = true;
            return Ok(());
        }
        *slot = Some(SccRequest {
            ticket,
            started_at: now,
            stale: false,
            handler: handler.clone(),
            handle: None,
        });
    }
    FetchMetrics::incr(&inner.metrics.scc_requests_issued);
    debug!(target: "tracker.scc", ticket, scc_type, "scc_request_issued");

    let weak = Arc::downgrade(inner);
    let handle = service.cat(
        &file.base_name(),
        &file.dir_name(),
        "",
        Box::new(move |code, message| {
            if let Some(inner) = weak.upgrade() {
                on_cat_complete(&inner, ticket, code, message);
            }
        }),
    );

    // Nothing to attach to if it completed (or expired) before `cat` returned.
    if let Some(pending) = inner.scc.lock().as_mut().filter(|p| p.ticket == ticket) {
        pending.handle = Some(handle);
    }
    Ok(())
}

fn on_cat_complete(inner: &Arc<TrackerInner>, ticket: u64, code: i32, message: String) {
    let request = {
        let mut slot = inner.scc.lock();
        match slot.as_ref() {
            Some(pending) if pending.ticket == ticket => slot.take(),
            _ => None,
        }
    };
    let Some(request) = request else {
        FetchMetrics::incr(&inner.metrics.late_results_discarded);
        info!(target: "tracker.scc", ticket, code, "scc_callback_ignored");
        return;
    };
    let handler = request.handler;

    if code != 0 {
        info!(target: "tracker.scc", ticket, code, "scc_request_failed");
        inner.report(
            &handler,
            TrackerError::SourceError {
                source_kind: SourceKind::Scc,
                message,
            },
        );
        return;
    }

    debug!(target: "tracker.scc", ticket, bytes = message.len(), "scc_contents_received");
    let reference = ReferenceSnapshot::from_text(&message, false);
    if let Err(e) = inner.notify_file_changes(&handler, reference) {
        inner.report(&handler, e);
    }

    if request.stale {
        FetchMetrics::incr(&inner.metrics.scc_reissues);
        info!(target: "tracker.scc", ticket, "scc_request_reissued");
        thread::sleep(inner.settings.reissue_delay);
        if let Err(e) = self::request(inner, &handler, Instant::now()) {
            inner.report(&handler, e);
        }
    }
}
