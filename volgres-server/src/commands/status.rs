use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;

use volgres_engine::{events, ledger, EventStore};
use volgres_models::{AutoResizeEvent, ClusterSpec, ResizeResult};

use crate::config::{self, Config};

/// Per-identity projection of the event history; the same derivation
/// the API snapshot uses, minus the live disk fields only a running
/// reconcile pass can supply
#[derive(Debug, Serialize, PartialEq)]
pub struct VolumeStatusRow {
    pub volume: String,
    pub remaining_budget: u32,
    pub success_count: u64,
    pub failed_count: u64,
    pub blocked_count: u64,
    pub blocked_reason: Option<String>,
}

pub async fn run_status(cluster: String, output: String) -> Result<()> {
    let config = Config::load()?;
    let spec = config::load_cluster_spec(&config.spec_path)?;
    if spec.name != cluster {
        anyhow::bail!(
            "Spec file '{}' describes cluster '{}', not '{}'",
            config.spec_path.display(),
            spec.name,
            cluster
        );
    }

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&config.database_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

    let store = EventStore::new(pool);
    let history = store.load_recent(&cluster).await?;
    let rows = status_rows(&spec, &history, Utc::now());

    if output == "json" {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    // Table format
    println!(
        "{:<28} {:>7} {:>8} {:>7} {:>8} {}",
        "VOLUME", "BUDGET", "SUCCESS", "FAILED", "BLOCKED", "BLOCK REASON"
    );
    println!("{}", "-".repeat(90));

    for row in &rows {
        println!(
            "{:<28} {:>7} {:>8} {:>7} {:>8} {}",
            row.volume,
            row.remaining_budget,
            row.success_count,
            row.failed_count,
            row.blocked_count,
            row.blocked_reason.as_deref().unwrap_or("-")
        );
    }

    println!();
    println!("{} volume(s)", rows.len());

    Ok(())
}

/// One row per logical volume identity, derived purely from the cluster
/// spec and the recent event history.
pub fn status_rows(
    spec: &ClusterSpec,
    history: &[AutoResizeEvent],
    now: DateTime<Utc>,
) -> Vec<VolumeStatusRow> {
    spec.volumes()
        .iter()
        .map(|vol| {
            let identity = vol.identity(&spec.name);
            let count = |result: ResizeResult| -> u64 {
                history
                    .iter()
                    .filter(|e| e.identity() == identity && e.result == result)
                    .count() as u64
            };

            // A block is current only while it is the identity's latest
            // event; a later success clears it
            let blocked_reason = events::latest_for_identity(history, &identity)
                .filter(|e| e.result == ResizeResult::Blocked)
                .map(|e| e.reason.clone());

            VolumeStatusRow {
                volume: identity.to_string(),
                remaining_budget: ledger::remaining_budget(
                    history,
                    &identity,
                    vol.resize.strategy.max_actions_per_day,
                    now,
                ),
                success_count: count(ResizeResult::Success),
                failed_count: count(ResizeResult::Failed),
                blocked_count: count(ResizeResult::Blocked),
                blocked_reason,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::path::PathBuf;
    use volgres_models::quantity::GIB;
    use volgres_models::{
        ExpansionPolicy, InstanceSpec, ResizePolicy, ResizeStep, StrategyPolicy, TriggerPolicy,
        VolumeRole, VolumeSpec,
    };

    fn policy() -> ResizePolicy {
        ResizePolicy {
            enabled: true,
            trigger: TriggerPolicy {
                usage_percent: Some(80),
                min_available: None,
            },
            expansion: ExpansionPolicy {
                step: ResizeStep::Percent(20.0),
                min_step: Some(GIB),
                max_step: Some(500 * GIB),
                limit: None,
            },
            strategy: StrategyPolicy::default(),
        }
    }

    fn spec() -> ClusterSpec {
        ClusterSpec {
            name: "prod".to_string(),
            namespace: "volgres".to_string(),
            instances: vec![InstanceSpec {
                name: "prod-1".to_string(),
                connection_string: None,
                archive_status_dir: None,
            }],
            data: VolumeSpec {
                mount: PathBuf::from("/var/lib/postgresql/data"),
                resize: policy(),
            },
            wal: Some(VolumeSpec {
                mount: PathBuf::from("/var/lib/postgresql/wal"),
                resize: policy(),
            }),
            tablespaces: vec![],
        }
    }

    fn event(
        role: VolumeRole,
        result: ResizeResult,
        reason: &str,
        age_hours: i64,
        now: DateTime<Utc>,
    ) -> AutoResizeEvent {
        AutoResizeEvent {
            cluster: "prod".to_string(),
            instance: "prod-1".to_string(),
            pvc_name: format!("prod-1-{}", role),
            role,
            tablespace: None,
            old_size_bytes: GIB as i64,
            new_size_bytes: 2 * GIB as i64,
            reason: reason.to_string(),
            result,
            occurred_at: now - Duration::hours(age_hours),
        }
    }

    #[test]
    fn test_status_rows_derive_counts_and_budget() {
        let now = Utc::now();
        let history = vec![
            event(VolumeRole::Data, ResizeResult::Success, "usage 82.0% >= 80%", 2, now),
            event(VolumeRole::Wal, ResizeResult::Blocked, "rate_limit", 1, now),
        ];

        let rows = status_rows(&spec(), &history, now);
        assert_eq!(rows.len(), 2);

        let data = &rows[0];
        assert_eq!(data.volume, "prod/data");
        assert_eq!(data.success_count, 1);
        assert_eq!(data.remaining_budget, 3);
        assert_eq!(data.blocked_reason, None);

        let wal = &rows[1];
        assert_eq!(wal.volume, "prod/wal");
        assert_eq!(wal.blocked_count, 1);
        // Blocked records are audit-only, never charged
        assert_eq!(wal.remaining_budget, 4);
        assert_eq!(wal.blocked_reason.as_deref(), Some("rate_limit"));
    }

    #[test]
    fn test_status_block_cleared_by_later_success() {
        let now = Utc::now();
        let history = vec![
            event(VolumeRole::Data, ResizeResult::Blocked, "rate_limit", 3, now),
            event(VolumeRole::Data, ResizeResult::Success, "usage 85.0% >= 80%", 1, now),
        ];

        let rows = status_rows(&spec(), &history, now);
        assert_eq!(rows[0].blocked_reason, None);
        assert_eq!(rows[0].blocked_count, 1);
    }

    #[test]
    fn test_status_empty_history_full_budget() {
        let rows = status_rows(&spec(), &[], Utc::now());
        assert!(rows.iter().all(|r| r.remaining_budget == 4));
        assert!(rows.iter().all(|r| r.blocked_reason.is_none()));
    }
}
