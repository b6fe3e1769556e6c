//! Volume stat sampler: per-mount filesystem statistics via statvfs.
//!
//! One call per relevant mount per probe cycle, no retries. A failed
//! probe leaves that volume's status stale until the next cycle; the
//! decision engine treats stale status as unknown, never as healthy.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ProbeError;

/// Raw filesystem statistics for one mount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskSample {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
    pub inodes_total: u64,
    pub inodes_used: u64,
    pub inodes_free: u64,
}

/// Sample a mount synchronously. Fails if the path is unmounted or
/// inaccessible.
#[cfg(unix)]
pub fn sample_mount(path: &Path) -> Result<DiskSample, ProbeError> {
    if !path.exists() {
        return Err(ProbeError::Unmounted(path.to_path_buf()));
    }

    let stat = nix::sys::statvfs::statvfs(path).map_err(|source| ProbeError::Statvfs {
        path: path.to_path_buf(),
        source,
    })?;

    // Byte math is in fragment-size units; f_bavail is the space an
    // unprivileged writer actually has (excludes the root reserve).
    let frsize = stat.fragment_size() as u64;
    let total_bytes = stat.blocks() as u64 * frsize;
    let available_bytes = stat.blocks_available() as u64 * frsize;
    let free_bytes = stat.blocks_free() as u64 * frsize;
    let used_bytes = total_bytes.saturating_sub(free_bytes);

    let inodes_total = stat.files() as u64;
    let inodes_free = stat.files_free() as u64;

    Ok(DiskSample {
        total_bytes,
        used_bytes,
        available_bytes,
        inodes_total,
        inodes_used: inodes_total.saturating_sub(inodes_free),
        inodes_free,
    })
}

#[cfg(not(unix))]
pub fn sample_mount(_path: &Path) -> Result<DiskSample, ProbeError> {
    Err(ProbeError::Unsupported)
}

/// Sample a mount off the async runtime with a bounded timeout. A
/// timed-out probe degrades the volume to stale rather than hanging the
/// reconciliation pass.
pub async fn sample_mount_timeout(
    path: PathBuf,
    timeout: Duration,
) -> Result<DiskSample, ProbeError> {
    let task = tokio::task::spawn_blocking(move || sample_mount(&path));
    match tokio::time::timeout(timeout, task).await {
        Ok(joined) => joined?,
        Err(_) => Err(ProbeError::Timeout(timeout)),
    }
}
