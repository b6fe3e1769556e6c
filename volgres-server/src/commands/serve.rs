//! The reconcile loop: fixed-interval passes over every instance and
//! volume of the configured cluster.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::RwLock;
use uuid::Uuid;

use volgres_engine::{
    history_cap, ledger, probe_instance, validate, EventStore, ResizeEngine, VolumeAction,
    VolumeReport,
};
use volgres_models::{AutoResizeEvent, ClusterSpec, ResizeResult, VolumeObservation};

use crate::api::{AppState, ClusterSnapshot, SharedSnapshot};
use crate::config::{self, Config};
use crate::db;

pub async fn run_serve(
    spec_override: Option<PathBuf>,
    port: u16,
    interval_override: Option<u64>,
) -> Result<()> {
    let config = Config::load()?;
    let spec_path = spec_override.unwrap_or_else(|| config.spec_path.clone());
    let spec = config::load_cluster_spec(&spec_path)?;

    tracing::info!("Starting Volgres for cluster '{}'", spec.name);
    tracing::info!(
        "  {} instance(s), {} volume role(s)",
        spec.instances.len(),
        spec.volumes().len()
    );

    // Admission check up front; volumes with errors are skipped per pass
    let report = validate::validate_cluster_spec(&spec);
    for (volume, warning) in report.warnings() {
        tracing::warn!("{}: {}", volume, warning);
    }
    for (volume, error) in report.errors() {
        tracing::error!("{}: {} (volume will be skipped)", volume, error);
    }

    // Durable event storage
    db::initialize_schema(&config.database_url).await?;
    db::verify_tables(&config.database_url).await?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to the event database")?;

    let events = EventStore::new(pool.clone());
    let kube = volgres_engine::k8s::get_k8s_client().await?;
    let engine = ResizeEngine::new(kube, events, config.freshness_secs);

    // Observability API
    let snapshot: SharedSnapshot = Arc::new(RwLock::new(None));
    let state = AppState {
        pool,
        cluster: spec.name.clone(),
        snapshot: snapshot.clone(),
    };
    let api_handle = tokio::spawn(async move {
        if let Err(e) = crate::api::start_server(port, state).await {
            tracing::error!("API server error: {}", e);
        }
    });

    let interval_secs = interval_override.unwrap_or(config.reconcile_interval_secs);
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));

    tracing::info!("✓ Volgres server ready");
    tracing::info!("  API: http://0.0.0.0:{}", port);
    tracing::info!("  Reconcile interval: {}s", interval_secs);
    tracing::info!("  Press Ctrl+C to stop");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = run_pass(&engine, &spec, &config, &snapshot).await {
                    tracing::error!("Reconcile pass failed: {:#}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    tracing::info!("Shutting down...");
    api_handle.abort();

    Ok(())
}

/// One reconciliation pass over every instance and volume.
async fn run_pass(
    engine: &ResizeEngine,
    spec: &ClusterSpec,
    config: &Config,
    snapshot: &Arc<RwLock<Option<ClusterSnapshot>>>,
) -> Result<()> {
    let pass_id = Uuid::new_v4();
    tracing::debug!(pass = %pass_id, cluster = %spec.name, "starting reconcile pass");

    let probe_timeout = Duration::from_secs(config.probe_timeout_secs);
    let mut reports: Vec<VolumeReport> = Vec::new();
    let mut errors: Vec<String> = Vec::new();

    for instance in &spec.instances {
        let status = probe_instance(spec, instance, probe_timeout).await;
        let instance_report = engine.reconcile_instance(spec, instance, &status).await;
        reports.extend(instance_report.reports);
        errors.extend(instance_report.errors);
    }

    // Observability projection from the post-pass history
    let history = engine.event_store().load_recent(&spec.name).await?;
    let volumes = build_observations(spec, &reports, &history);
    *snapshot.write().await = Some(ClusterSnapshot {
        cluster: spec.name.clone(),
        pass_id: pass_id.to_string(),
        completed_at: Utc::now(),
        volumes,
    });

    let pruned = engine
        .event_store()
        .prune(&spec.name, history_cap(spec))
        .await?;
    if pruned > 0 {
        tracing::debug!(pass = %pass_id, pruned, "pruned old resize events");
    }

    // Per-volume errors are aggregated, never allowed to abort siblings
    if errors.is_empty() {
        tracing::debug!(pass = %pass_id, volumes = reports.len(), "reconcile pass complete");
    } else {
        tracing::warn!(
            pass = %pass_id,
            "reconcile pass completed with {} volume error(s): {}",
            errors.len(),
            errors.join("; ")
        );
    }

    Ok(())
}

/// Derive the per-identity observability view from pass reports and the
/// event history.
fn build_observations(
    spec: &ClusterSpec,
    reports: &[VolumeReport],
    history: &[AutoResizeEvent],
) -> Vec<VolumeObservation> {
    let now = Utc::now();
    reports
        .iter()
        .map(|report| {
            let for_identity: Vec<&AutoResizeEvent> = history
                .iter()
                .filter(|e| e.identity() == report.identity)
                .collect();
            let count = |result: ResizeResult| -> u64 {
                for_identity.iter().filter(|e| e.result == result).count() as u64
            };

            // Budget recomputed from the post-pass history so a resize
            // issued this pass is already charged
            let max_per_day = spec
                .volumes()
                .iter()
                .find(|v| v.identity(&spec.name) == report.identity)
                .map(|v| v.resize.strategy.max_actions_per_day)
                .unwrap_or(0);
            let remaining_budget =
                ledger::remaining_budget(history, &report.identity, max_per_day, now);

            let blocked_reason = match &report.action {
                VolumeAction::Blocked { reason } => Some(reason.clone()),
                VolumeAction::ConfigInvalid { errors } => {
                    Some(format!("config_invalid: {}", errors.join("; ")))
                }
                _ => None,
            };

            VolumeObservation {
                identity: report.identity.clone(),
                instance: report.instance.clone(),
                pvc_name: report.pvc_name.clone(),
                percent_used: report.percent_used,
                current_size_bytes: report.current_size_bytes,
                at_limit: report.at_limit,
                blocked_reason,
                remaining_budget,
                success_count: count(ResizeResult::Success),
                failed_count: count(ResizeResult::Failed),
                blocked_count: count(ResizeResult::Blocked),
            }
        })
        .collect()
}
