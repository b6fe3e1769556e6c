//! WAL health evaluator: archiver status, pending archive files, and
//! inactive replication slot retention from the running database.
//!
//! The three sub-checks are independent; a failure in one never aborts
//! the others. A failed sub-check leaves its field unknown (`None`) and
//! logs at warn level. Silently defaulting to "healthy" here would make
//! the WAL safety gate fail open with no signal at all, which is the one
//! failure mode this module must never have.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_postgres::NoTls;
use tracing::warn;

use volgres_models::{InactiveSlot, WalHealthInfo};

use crate::error::ProbeError;

/// Connect to an instance for health queries, with a bounded timeout.
///
/// The connection task is spawned and logs its own errors; the client is
/// dropped at the end of the probe cycle.
pub async fn connect(
    connection_string: &str,
    timeout: Duration,
) -> Result<tokio_postgres::Client, ProbeError> {
    let connect = tokio_postgres::connect(connection_string, NoTls);
    let (client, connection) = match tokio::time::timeout(timeout, connect).await {
        Ok(result) => result?,
        Err(_) => return Err(ProbeError::Timeout(timeout)),
    };

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            warn!("postgres connection error during health probe: {}", e);
        }
    });

    Ok(client)
}

/// Evaluate WAL health for one instance.
pub async fn evaluate(
    client: Option<&tokio_postgres::Client>,
    archive_status_dir: &Path,
) -> WalHealthInfo {
    let pending_archive_files = match count_pending_archive_files(archive_status_dir) {
        Ok(count) => Some(count),
        Err(e) => {
            warn!(
                dir = %archive_status_dir.display(),
                "failed to count pending archive files, treating as unknown: {}", e
            );
            None
        }
    };

    let (archive_healthy, inactive_slots) = match client {
        Some(client) => {
            let archive_healthy = match query_archiver_timestamps(client).await {
                Ok((last_success, last_failure)) => {
                    Some(archive_healthy_from(last_success, last_failure))
                }
                Err(e) => {
                    warn!("archiver status query failed, treating as unknown: {}", e);
                    None
                }
            };

            let inactive_slots = match query_inactive_slots(client).await {
                Ok(slots) => Some(slots),
                Err(e) => {
                    warn!("replication slot query failed, treating as unknown: {}", e);
                    None
                }
            };

            (archive_healthy, inactive_slots)
        }
        None => {
            warn!("no database connection for WAL health, archiver and slot state unknown");
            (None, None)
        }
    };

    WalHealthInfo {
        archive_healthy,
        pending_archive_files,
        inactive_slots,
        collected_at: Utc::now(),
    }
}

/// Count WAL segments awaiting archival by listing `*.ready` markers in
/// the archive-status directory. A missing directory is a valid "zero
/// pending" result, not an error.
pub fn count_pending_archive_files(dir: &Path) -> Result<u64, std::io::Error> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut count = 0u64;
    for entry in entries {
        let entry = entry?;
        if entry.file_name().to_string_lossy().ends_with(".ready") {
            count += 1;
        }
    }
    Ok(count)
}

/// Healthy unless a failure timestamp exists and is more recent than the
/// last success.
pub fn archive_healthy_from(
    last_success: Option<DateTime<Utc>>,
    last_failure: Option<DateTime<Utc>>,
) -> bool {
    match (last_success, last_failure) {
        (_, None) => true,
        (Some(ok), Some(failed)) => ok >= failed,
        (None, Some(_)) => false,
    }
}

async fn query_archiver_timestamps(
    client: &tokio_postgres::Client,
) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>), tokio_postgres::Error> {
    let row = client
        .query_one(
            "SELECT last_archived_time, last_failed_time FROM pg_stat_archiver",
            &[],
        )
        .await?;

    Ok((row.get(0), row.get(1)))
}

async fn query_inactive_slots(
    client: &tokio_postgres::Client,
) -> Result<Vec<InactiveSlot>, tokio_postgres::Error> {
    // Retained bytes = distance between the current write position and
    // the slot's restart position; NULL restart_lsn means nothing is
    // retained yet.
    let rows = client
        .query(
            "SELECT slot_name,
                    COALESCE(pg_wal_lsn_diff(pg_current_wal_lsn(), restart_lsn), 0)::bigint
             FROM pg_replication_slots
             WHERE slot_type = 'physical' AND NOT active",
            &[],
        )
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let name: String = row.get(0);
            let retained: i64 = row.get(1);
            InactiveSlot {
                name,
                retained_bytes: retained.max(0) as u64,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_archive_healthy_no_failure() {
        assert!(archive_healthy_from(None, None));
        assert!(archive_healthy_from(Some(Utc::now()), None));
    }

    #[test]
    fn test_archive_unhealthy_failure_after_success() {
        let now = Utc::now();
        assert!(!archive_healthy_from(Some(now - Duration::minutes(5)), Some(now)));
        assert!(!archive_healthy_from(None, Some(now)));
    }

    #[test]
    fn test_archive_healthy_success_after_failure() {
        let now = Utc::now();
        assert!(archive_healthy_from(Some(now), Some(now - Duration::minutes(5))));
        // A success at the exact failure instant counts as recovered
        assert!(archive_healthy_from(Some(now), Some(now)));
    }

    #[test]
    fn test_count_pending_missing_dir_is_zero() {
        let dir = std::env::temp_dir().join(format!("volgres-absent-{}", uuid::Uuid::new_v4()));
        assert_eq!(count_pending_archive_files(&dir).unwrap(), 0);
    }

    #[test]
    fn test_count_pending_only_ready_markers() {
        let dir = std::env::temp_dir().join(format!("volgres-archive-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        std::fs::write(dir.join("000000010000000000000001.ready"), b"").unwrap();
        std::fs::write(dir.join("000000010000000000000002.ready"), b"").unwrap();
        std::fs::write(dir.join("000000010000000000000003.done"), b"").unwrap();

        assert_eq!(count_pending_archive_files(&dir).unwrap(), 2);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_evaluate_without_connection_is_unknown_not_healthy() {
        let dir = std::env::temp_dir().join(format!("volgres-absent-{}", uuid::Uuid::new_v4()));
        let info = evaluate(None, &dir).await;

        assert_eq!(info.archive_healthy, None);
        assert_eq!(info.inactive_slots, None);
        // The filesystem check still ran and found nothing pending
        assert_eq!(info.pending_archive_files, Some(0));
        assert!(!info.is_entirely_unknown());
    }
}
