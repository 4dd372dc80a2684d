use core_index::IndexError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Which reference source a fetch targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Disk,
    Scc,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceKind::Disk => "on-disk",
            SourceKind::Scc => "scc",
        })
    }
}

/// Failures below the coordinator boundary. Each one is either turned into a
/// handler error or ends the update quietly; none crosses a thread boundary as
/// a panic. Handler failures are contained by the delivery context itself.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The bound document has been dropped.
    #[error("document reference has expired")]
    ReferenceExpired,

    /// The document has no live view/buffer right now.
    #[error("document view no longer exists")]
    ViewUnavailable,

    #[error(transparent)]
    UnsupportedDiffTag(#[from] IndexError),

    #[error("could not get {source_kind} file contents in {} seconds", .timeout.as_secs())]
    FetchTimeout {
        source_kind: SourceKind,
        timeout: Duration,
    },

    #[error("{0}")]
    SourceUnavailable(String),

    #[error("{source_kind} error {message}")]
    SourceError {
        source_kind: SourceKind,
        message: String,
    },

    #[error("{source_kind} contents are not valid UTF-8 (first bad byte at {valid_up_to})")]
    EncodingFailure {
        source_kind: SourceKind,
        valid_up_to: usize,
    },
}

impl TrackerError {
    /// Conditions that end an update without telling the handler.
    pub fn is_quiet(&self) -> bool {
        matches!(
            self,
            TrackerError::ReferenceExpired | TrackerError::ViewUnavailable
        )
    }
}
