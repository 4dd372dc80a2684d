//! Change tracking for one document.
//!
//! A [`ChangeTracker`] is bound (weakly) to a [`Document`] and keeps the
//! reference snapshot plus the [`ChangeIndex`](core_index::ChangeIndex) built
//! against it. `update` fetches the reference from disk or from version
//! control, diffs it against the current buffer and hands the rebuild to the
//! delivery context, where the index is swapped and the handler notified in
//! one step. `query` reads whichever complete index is current.

use core_config::Config;
use std::time::Duration;

pub mod debounce;
mod disk;
pub mod document;
pub mod error;
pub mod hunk;
pub mod margin;
pub mod query;
mod scc;
pub mod snapshot;
pub mod tracker;
pub mod vcs;

pub use debounce::UpdateDebouncer;
pub use document::{Document, DocumentKind, FileDescriptor, FileDocument};
pub use error::{SourceKind, TrackerError};
pub use hunk::{revert, to_unified};
pub use margin::{MarginHandler, MarkerDelta, MarkerModel};
pub use query::{ChangeKind, LineChange};
pub use snapshot::ReferenceSnapshot;
pub use tracker::{ChangeTracker, FetchMetricsSnapshot, TrackerBuilder};
pub use vcs::{CatCallback, CatHandle, GitService, VcsRegistry, VcsService};

/// Shared by the disk and scc coordinators.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// Pause before re-issuing an scc request that went stale while in flight.
pub const REISSUE_DELAY: Duration = Duration::from_millis(500);
/// Quiet period before a debounced update runs.
pub const UPDATE_DELAY: Duration = Duration::from_millis(500);
pub const DISK_WORKER_THREAD_NAME: &str = "changetrack-ondisk";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerSettings {
    pub enabled: bool,
    pub request_timeout: Duration,
    pub reissue_delay: Duration,
    pub update_delay: Duration,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            request_timeout: REQUEST_TIMEOUT,
            reissue_delay: REISSUE_DELAY,
            update_delay: UPDATE_DELAY,
        }
    }
}

impl TrackerSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            enabled: cfg.enabled(),
            request_timeout: cfg.request_timeout(),
            reissue_delay: cfg.reissue_delay(),
            update_delay: cfg.update_delay(),
        }
    }
}
