//! Persisted auto-resize event store.
//!
//! Events are the single durable source of truth: the budget ledger, the
//! observability counters, and the blocked-condition display are all
//! derived from this table. Append-only; pruning keeps the history
//! bounded while preserving enough depth for rolling-window math.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use sqlx::PgPool;

use volgres_models::{AutoResizeEvent, ResizeResult, VolumeIdentity};

const SELECT_COLUMNS: &str = "cluster, instance, pvc_name, role, tablespace, \
     old_size_bytes, new_size_bytes, reason, result, occurred_at";

#[derive(Clone)]
pub struct EventStore {
    pool: PgPool,
}

impl EventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append one audit record
    pub async fn append(&self, event: &AutoResizeEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO volgres.resize_events
             (cluster, instance, pvc_name, role, tablespace,
              old_size_bytes, new_size_bytes, reason, result, occurred_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(&event.cluster)
        .bind(&event.instance)
        .bind(&event.pvc_name)
        .bind(event.role)
        .bind(&event.tablespace)
        .bind(event.old_size_bytes)
        .bind(event.new_size_bytes)
        .bind(&event.reason)
        .bind(event.result)
        .bind(event.occurred_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert resize event")?;

        Ok(())
    }

    /// Events for a cluster within the trailing 48 hours, oldest first.
    ///
    /// Twice the ledger window so the rolling-window count is always
    /// complete even right after a prune.
    pub async fn load_recent(&self, cluster: &str) -> Result<Vec<AutoResizeEvent>> {
        let cutoff = Utc::now() - Duration::hours(48);
        sqlx::query_as::<_, AutoResizeEvent>(&format!(
            "SELECT {SELECT_COLUMNS}
             FROM volgres.resize_events
             WHERE cluster = $1 AND occurred_at > $2
             ORDER BY occurred_at ASC"
        ))
        .bind(cluster)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load recent resize events")
    }

    /// Latest events for a cluster, newest first, for the audit surface
    pub async fn load_latest(&self, cluster: &str, limit: i64) -> Result<Vec<AutoResizeEvent>> {
        sqlx::query_as::<_, AutoResizeEvent>(&format!(
            "SELECT {SELECT_COLUMNS}
             FROM volgres.resize_events
             WHERE cluster = $1
             ORDER BY occurred_at DESC
             LIMIT $2"
        ))
        .bind(cluster)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load latest resize events")
    }

    /// Cap a cluster's history at `keep` rows, dropping the oldest.
    ///
    /// Returns the number of rows pruned.
    pub async fn prune(&self, cluster: &str, keep: i64) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM volgres.resize_events
             WHERE cluster = $1 AND id NOT IN (
                 SELECT id FROM volgres.resize_events
                 WHERE cluster = $1
                 ORDER BY occurred_at DESC
                 LIMIT $2
             )",
        )
        .bind(cluster)
        .bind(keep)
        .execute(&self.pool)
        .await
        .context("Failed to prune resize events")?;

        Ok(result.rows_affected())
    }
}

/// The most recent event for a logical identity, from an oldest-first
/// history slice
pub fn latest_for_identity<'a>(
    events: &'a [AutoResizeEvent],
    identity: &VolumeIdentity,
) -> Option<&'a AutoResizeEvent> {
    events.iter().rev().find(|e| e.identity() == *identity)
}

/// Whether a freshly decided block needs persisting.
///
/// A block re-detected on every pass would otherwise append an identical
/// row per pass; only a change of condition is worth recording. A later
/// success naturally clears the block.
pub fn block_needs_recording(
    events: &[AutoResizeEvent],
    identity: &VolumeIdentity,
    reason: &str,
) -> bool {
    match latest_for_identity(events, identity) {
        Some(last) => last.result != ResizeResult::Blocked || last.reason != reason,
        None => true,
    }
}
