//! Error taxonomy for the resize engine.
//!
//! Blocked and budget-exhausted outcomes are deliberate decision states,
//! not errors; they live in [`crate::decision::Outcome`]. Nothing here is
//! fatal to the owning process.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// The sampler or WAL evaluator could not read current state. The
/// affected volume goes stale and the pass continues.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("mount path '{0}' does not exist")]
    Unmounted(PathBuf),

    #[cfg(unix)]
    #[error("statvfs failed for '{path}': {source}")]
    Statvfs {
        path: PathBuf,
        source: nix::Error,
    },

    #[cfg(not(unix))]
    #[error("filesystem statistics are not supported on this platform")]
    Unsupported,

    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("database query failed: {0}")]
    Query(#[from] tokio_postgres::Error),

    #[error("probe task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// The storage platform rejected or failed a resize request. Recorded as
/// a `failed` event and retried naturally on the next pass.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("PVC '{0}' not found")]
    NotFound(String),

    #[error("PVC '{pvc}' carries an unparseable storage quantity '{value}'")]
    InvalidQuantity { pvc: String, value: String },

    #[error("PVC '{pvc}' has no storage request or capacity")]
    MissingStorage { pvc: String },

    #[error(transparent)]
    Api(#[from] kube::Error),
}
