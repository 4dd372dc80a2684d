//! Handler contract and the single-consumer delivery context.

// -------------------------------------------------------------------------------------------------
// Delivery Policy
// -------------------------------------------------------------------------------------------------
// Every handler invocation happens on one dedicated thread that drains an unbounded channel in
// FIFO order. Producers (disk workers, VCS callbacks, the caller's own thread) only enqueue. This
// gives handler authors a single-threaded view: no two deliveries overlap and no handler ever runs
// on the thread that produced its data. Index rebuilds are enqueued as `Apply` jobs so the swap of
// snapshot + index and the summary derived from it happen in the same step as the delivery.
//
// A handler that panics or returns `Err` is logged and skipped; the consumer keeps running.
// -------------------------------------------------------------------------------------------------

use core_index::ChangeSummary;
use crossbeam_channel::{Receiver, Sender};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub const DELIVERY_THREAD_NAME: &str = "changetrack-delivery";

/// Consumer-supplied receiver of change notifications. Both methods are only
/// ever called on the delivery thread.
pub trait ChangeHandler: Send + Sync + 'static {
    fn on_error(&self, message: &str);

    /// `inserted` and `modified` are flattened `(anchor, end)` pairs.
    fn mark_changes(
        &self,
        deleted: &[usize],
        inserted: &[usize],
        modified: &[usize],
    ) -> anyhow::Result<()>;
}

pub type HandlerRef = Arc<dyn ChangeHandler>;

/// A handler callback that failed. Logged on the delivery thread and swallowed.
#[derive(Debug, Error)]
pub enum HandlerFailure {
    #[error("change handler returned an error: {0}")]
    Returned(anyhow::Error),
    #[error("change handler panicked: {0}")]
    Panicked(String),
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Changes(ChangeSummary),
    Error(String),
}

/// Work executed on the delivery thread; its notification (if any) goes to the
/// job's handler right afterwards.
pub type DeliveryJob = Box<dyn FnOnce() -> Option<Notification> + Send>;

pub enum Delivery {
    Notify {
        handler: HandlerRef,
        notification: Notification,
    },
    Apply {
        handler: HandlerRef,
        job: DeliveryJob,
    },
    /// Acknowledged once everything queued before it has been delivered.
    Barrier(Sender<()>),
    Shutdown,
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Delivery::Notify { notification, .. } => {
                f.debug_tuple("Notify").field(notification).finish()
            }
            Delivery::Apply { .. } => f.write_str("Apply"),
            Delivery::Barrier(_) => f.write_str("Barrier"),
            Delivery::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Delivery counters (relaxed atomics, inspected by tests and periodic logging).
#[derive(Debug, Default)]
pub struct DeliveryMetrics {
    changes: AtomicU64,
    errors: AtomicU64,
    jobs: AtomicU64,
    handler_failures: AtomicU64,
    send_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryMetricsSnapshot {
    pub changes: u64,
    pub errors: u64,
    pub jobs: u64,
    pub handler_failures: u64,
    pub send_failures: u64,
}

impl DeliveryMetrics {
    pub fn snapshot(&self) -> DeliveryMetricsSnapshot {
        use Ordering::Relaxed;
        DeliveryMetricsSnapshot {
            changes: self.changes.load(Relaxed),
            errors: self.errors.load(Relaxed),
            jobs: self.jobs.load(Relaxed),
            handler_failures: self.handler_failures.load(Relaxed),
            send_failures: self.send_failures.load(Relaxed),
        }
    }

    fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Producer side of the delivery channel. Cheap to clone; safe to use from any thread.
#[derive(Clone)]
pub struct NotificationSink {
    tx: Sender<Delivery>,
    metrics: Arc<DeliveryMetrics>,
}

impl NotificationSink {
    pub fn notify_error(&self, handler: &HandlerRef, message: impl Into<String>) {
        self.send(Delivery::Notify {
            handler: handler.clone(),
            notification: Notification::Error(message.into()),
        });
    }

    pub fn notify_changes(&self, handler: &HandlerRef, summary: ChangeSummary) {
        self.send(Delivery::Notify {
            handler: handler.clone(),
            notification: Notification::Changes(summary),
        });
    }

    /// Run `job` on the delivery thread and deliver its result to `handler`.
    pub fn submit<F>(&self, handler: &HandlerRef, job: F)
    where
        F: FnOnce() -> Option<Notification> + Send + 'static,
    {
        self.send(Delivery::Apply {
            handler: handler.clone(),
            job: Box::new(job),
        });
    }

    pub fn metrics(&self) -> DeliveryMetricsSnapshot {
        self.metrics.snapshot()
    }

    fn send(&self, delivery: Delivery) {
        if let Err(e) = self.tx.send(delivery) {
            DeliveryMetrics::incr(&self.metrics.send_failures);
            warn!(target: "delivery", kind = ?e.into_inner(), "delivery_context_closed");
        }
    }
}

/// Owns the delivery thread. Dropping the context stops the consumer after it
/// drains what was already queued.
pub struct DeliveryContext {
    tx: Sender<Delivery>,
    metrics: Arc<DeliveryMetrics>,
    thread: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl DeliveryContext {
    pub fn spawn() -> std::io::Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded::<Delivery>();
        let metrics = Arc::new(DeliveryMetrics::default());
        let consumer_metrics = metrics.clone();
        let handle = thread::Builder::new()
            .name(DELIVERY_THREAD_NAME.to_string())
            .spawn(move || run_consumer(rx, consumer_metrics))?;
        let thread_id = handle.thread().id();
        info!(target: "delivery", "delivery_context_started");
        Ok(Self {
            tx,
            metrics,
            thread: Some(handle),
            thread_id,
        })
    }

    pub fn sink(&self) -> NotificationSink {
        NotificationSink {
            tx: self.tx.clone(),
            metrics: self.metrics.clone(),
        }
    }

    /// True when called from the delivery thread itself.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Block until every delivery queued before this call has been handled.
    /// Returns false on timeout or when the consumer is gone.
    pub fn flush(&self, timeout: Duration) -> bool {
        if self.is_current() {
            return false;
        }
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        if self.tx.send(Delivery::Barrier(ack_tx)).is_err() {
            return false;
        }
        ack_rx.recv_timeout(timeout).is_ok()
    }

    pub fn metrics(&self) -> DeliveryMetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl Drop for DeliveryContext {
    fn drop(&mut self) {
        let _ = self.tx.send(Delivery::Shutdown);
        if let Some(handle) = self.thread.take()
            && !self.is_current()
            && handle.join().is_err()
        {
            error!(target: "delivery", "delivery_thread_join_failed");
        }
    }
}

fn run_consumer(rx: Receiver<Delivery>, metrics: Arc<DeliveryMetrics>) {
    for delivery in rx.iter() {
        match delivery {
            Delivery::Notify {
                handler,
                notification,
            } => deliver(&handler, notification, &metrics),
            Delivery::Apply { handler, job } => {
                DeliveryMetrics::incr(&metrics.jobs);
                match catch_unwind(AssertUnwindSafe(job)) {
                    Ok(Some(notification)) => deliver(&handler, notification, &metrics),
                    Ok(None) => {}
                    Err(_) => error!(target: "delivery", "delivery_job_panicked"),
                }
            }
            Delivery::Barrier(ack) => {
                let _ = ack.send(());
            }
            Delivery::Shutdown => break,
        }
    }
    debug!(target: "delivery", "delivery_context_stopped");
}

fn deliver(handler: &HandlerRef, notification: Notification, metrics: &DeliveryMetrics) {
    let outcome = catch_unwind(AssertUnwindSafe(|| match &notification {
        Notification::Changes(summary) => {
            DeliveryMetrics::incr(&metrics.changes);
            handler.mark_changes(&summary.deleted, &summary.inserted, &summary.modified)
        }
        Notification::Error(message) => {
            DeliveryMetrics::incr(&metrics.errors);
            handler.on_error(message);
            Ok(())
        }
    }));
    let failure = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(e)) => HandlerFailure::Returned(e),
        Err(payload) => HandlerFailure::Panicked(panic_message(payload.as_ref())),
    };
    DeliveryMetrics::incr(&metrics.handler_failures);
    error!(target: "delivery", error = %failure, "handler_failed");
}
