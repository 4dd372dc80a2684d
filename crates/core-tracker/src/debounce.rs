//! Delayed updates: bursts of edit notifications collapse into one `update`
//! once the buffer has been quiet for the configured delay.

use crate::tracker::ChangeTracker;
use core_events::HandlerRef;
use crossbeam_channel::{RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error};

pub const DEBOUNCE_THREAD_NAME: &str = "changetrack-debounce";

pub struct UpdateDebouncer {
    tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl UpdateDebouncer {
    pub fn spawn(
        tracker: ChangeTracker,
        handler: HandlerRef,
        delay: Duration,
    ) -> std::io::Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded::<()>();
        let handle = thread::Builder::new()
            .name(DEBOUNCE_THREAD_NAME.to_string())
            .spawn(move || {
                // Wait for the first poke of a burst, then for `delay` of silence.
                while rx.recv().is_ok() {
                    let mut coalesced = 0u64;
                    loop {
                        match rx.recv_timeout(delay) {
                            Ok(()) => coalesced += 1,
                            Err(RecvTimeoutError::Timeout) => break,
                            Err(RecvTimeoutError::Disconnected) => return,
                        }
                    }
                    debug!(target: "tracker.debounce", coalesced, "debounced_update");
                    tracker.update(&handler);
                }
            })?;
        Ok(Self {
            tx: Some(tx),
            thread: Some(handle),
        })
    }

    /// Debouncer using the tracker's configured quiet period.
    pub fn for_tracker(tracker: ChangeTracker, handler: HandlerRef) -> std::io::Result<Self> {
        let delay = tracker.settings().update_delay;
        Self::spawn(tracker, handler, delay)
    }

    /// Note an edit; the update runs `delay` after the last poke.
    pub fn poke(&self) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(());
        }
    }
}

impl Drop for UpdateDebouncer {
    fn drop(&mut self) {
        // Closing the channel ends the loop; a pending burst is dropped.
        self.tx.take();
        if let Some(handle) = self.thread.take()
            && handle.join().is_err()
        {
            error!(target: "tracker.debounce", "debounce_thread_join_failed");
        }
    }
}
