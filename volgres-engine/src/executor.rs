//! Pass execution: runs the decision state machine against live cluster
//! state, issues PVC patches, and appends audit events.
//!
//! Volumes of one instance are evaluated independently; a failure on one
//! is collected and surfaced alongside the others, never allowed to
//! abort them.

use chrono::Utc;
use kube::Client;
use tracing::{debug, info, warn};

use volgres_models::{
    pvc_name, AutoResizeEvent, ClusterSpec, InstanceSpec, ResizeResult, VolumeIdentity, VolumeRef,
    VolumeRole,
};

use crate::decision::{self, GateInput, Outcome};
use crate::events::{self, EventStore};
use crate::status::InstanceStatus;
use crate::{k8s, ledger, validate};

/// What happened to one volume in one pass
#[derive(Debug, Clone, PartialEq)]
pub enum VolumeAction {
    /// Terminal without an action: disabled, not triggered, stale
    /// status, or no headroom
    None { detail: &'static str },
    /// Triggered but refused, with the recorded reason
    Blocked { reason: String },
    /// Patch issued and accepted
    Resized {
        from: u64,
        to: u64,
        wal_unverified: bool,
    },
    /// Patch issued and rejected by the storage platform
    PatchFailed { to: u64, error: String },
    /// Policy invalid; volume skipped, siblings unaffected
    ConfigInvalid { errors: Vec<String> },
}

/// Per-volume summary surfaced to the observability layer
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeReport {
    pub identity: VolumeIdentity,
    pub instance: String,
    pub pvc_name: String,
    pub current_size_bytes: Option<u64>,
    pub percent_used: Option<f64>,
    pub at_limit: bool,
    pub remaining_budget: u32,
    pub action: VolumeAction,
}

/// All volume reports for one instance, plus the errors that kept some
/// volumes from being evaluated at all
#[derive(Debug)]
pub struct InstancePassReport {
    pub instance: String,
    pub reports: Vec<VolumeReport>,
    pub errors: Vec<String>,
}

pub struct ResizeEngine {
    kube: Client,
    events: EventStore,
    /// Status older than this is unknown to the gates
    freshness: chrono::Duration,
}

impl ResizeEngine {
    pub fn new(kube: Client, events: EventStore, freshness_secs: u64) -> Self {
        Self {
            kube,
            events,
            freshness: chrono::Duration::seconds(freshness_secs as i64),
        }
    }

    pub fn event_store(&self) -> &EventStore {
        &self.events
    }

    /// Evaluate every volume of one instance.
    pub async fn reconcile_instance(
        &self,
        spec: &ClusterSpec,
        instance: &InstanceSpec,
        status: &InstanceStatus,
    ) -> InstancePassReport {
        let mut report = InstancePassReport {
            instance: instance.name.clone(),
            reports: Vec::new(),
            errors: Vec::new(),
        };

        // One history load feeds the ledger for every volume of the pass
        let history = match self.events.load_recent(&spec.name).await {
            Ok(history) => history,
            Err(e) => {
                report
                    .errors
                    .push(format!("{}: failed to load event history: {:#}", spec.name, e));
                return report;
            }
        };

        for vol in spec.volumes() {
            let identity = vol.identity(&spec.name);
            match self
                .reconcile_volume(spec, instance, &vol, status, &history)
                .await
            {
                Ok(volume_report) => report.reports.push(volume_report),
                Err(e) => report.errors.push(format!("{}: {:#}", identity, e)),
            }
        }

        report
    }

    async fn reconcile_volume(
        &self,
        spec: &ClusterSpec,
        instance: &InstanceSpec,
        vol: &VolumeRef<'_>,
        status: &InstanceStatus,
        history: &[AutoResizeEvent],
    ) -> anyhow::Result<VolumeReport> {
        let identity = vol.identity(&spec.name);
        let pvc = pvc_name(&instance.name, vol.role, vol.tablespace);
        let now = Utc::now();

        let findings = validate::validate_volume(spec, vol);
        if !findings.is_valid() {
            warn!(volume = %identity, "policy invalid, skipping: {}", findings.errors.join("; "));
            return Ok(VolumeReport {
                identity,
                instance: instance.name.clone(),
                pvc_name: pvc,
                current_size_bytes: None,
                percent_used: None,
                at_limit: false,
                remaining_budget: 0,
                action: VolumeAction::ConfigInvalid {
                    errors: findings.errors,
                },
            });
        }

        let current_size = k8s::current_pvc_size(&self.kube, &spec.namespace, &pvc).await?;

        if let Some(limit) = vol.resize.expansion.limit {
            if limit < current_size {
                warn!(
                    volume = %identity,
                    "configured limit {} is below the current size {}; resize is a permanent no-op",
                    limit, current_size
                );
            }
        }

        let disk = status.fresh_disk(&identity, now, self.freshness);
        let wal = status.fresh_wal(now, self.freshness);
        let wal_gate_applies =
            vol.role == VolumeRole::Wal || (vol.role == VolumeRole::Data && !spec.has_separate_wal());
        let remaining_budget = ledger::remaining_budget(
            history,
            &identity,
            vol.resize.strategy.max_actions_per_day,
            now,
        );

        let outcome = decision::evaluate(&GateInput {
            policy: vol.resize,
            disk,
            wal,
            current_size,
            remaining_budget,
            wal_gate_applies,
        });

        let mut report = VolumeReport {
            identity: identity.clone(),
            instance: instance.name.clone(),
            pvc_name: pvc.clone(),
            current_size_bytes: Some(current_size),
            percent_used: disk.map(|d| d.percent_used),
            at_limit: at_configured_ceiling(vol.resize.expansion.limit, current_size),
            remaining_budget,
            action: VolumeAction::None { detail: "" },
        };

        match outcome {
            Outcome::Disabled => {
                report.action = VolumeAction::None { detail: "disabled" };
            }
            Outcome::StatusStale => {
                warn!(volume = %identity, "disk status stale or missing, not evaluating");
                report.action = VolumeAction::None {
                    detail: "status_stale",
                };
            }
            Outcome::NotTriggered => {
                debug!(volume = %identity, "not triggered");
                report.action = VolumeAction::None {
                    detail: "not_triggered",
                };
            }
            Outcome::NoHeadroom => {
                debug!(volume = %identity, "clamped delta left no headroom");
                report.action = VolumeAction::None {
                    detail: "no_headroom",
                };
            }
            Outcome::AtCeiling => {
                let reason = "at_limit".to_string();
                info!(volume = %identity, "triggered but already at the configured size limit");
                self.record_block(&identity, instance, &pvc, current_size, &reason, history)
                    .await?;
                report.action = VolumeAction::Blocked { reason };
            }
            Outcome::Blocked(block) => {
                let reason = block.to_string();
                info!(volume = %identity, reason = %reason, "resize blocked");
                self.record_block(&identity, instance, &pvc, current_size, &reason, history)
                    .await?;
                report.action = VolumeAction::Blocked { reason };
            }
            Outcome::Resize {
                new_size,
                wal_unverified,
            } => {
                let mut reason = disk
                    .map(|d| decision::describe_trigger(&vol.resize.trigger, d))
                    .unwrap_or_else(|| "triggered".to_string());
                if wal_unverified {
                    // Distinguishable marker: this resize bypassed an
                    // unverifiable WAL safety gate
                    reason.push_str(" [wal safety unverified]");
                    warn!(
                        volume = %identity,
                        "WAL health unknown, proceeding unverified"
                    );
                }

                match k8s::patch_pvc_storage(&self.kube, &spec.namespace, &pvc, new_size).await {
                    Ok(()) => {
                        info!(
                            volume = %identity,
                            pvc = %pvc,
                            from = current_size,
                            to = new_size,
                            "✓ volume resize requested"
                        );
                        self.append_event(
                            &identity,
                            instance,
                            &pvc,
                            current_size,
                            new_size,
                            reason,
                            ResizeResult::Success,
                        )
                        .await?;
                        report.action = VolumeAction::Resized {
                            from: current_size,
                            to: new_size,
                            wal_unverified,
                        };
                    }
                    Err(e) => {
                        // Reported, recorded, and retried naturally on
                        // the next pass; never retried within this one
                        warn!(volume = %identity, "PVC patch failed: {}", e);
                        self.append_event(
                            &identity,
                            instance,
                            &pvc,
                            current_size,
                            new_size,
                            format!("{} (patch failed: {})", reason, e),
                            ResizeResult::Failed,
                        )
                        .await?;
                        report.action = VolumeAction::PatchFailed {
                            to: new_size,
                            error: e.to_string(),
                        };
                    }
                }
            }
        }

        Ok(report)
    }

    async fn record_block(
        &self,
        identity: &VolumeIdentity,
        instance: &InstanceSpec,
        pvc: &str,
        current_size: u64,
        reason: &str,
        history: &[AutoResizeEvent],
    ) -> anyhow::Result<()> {
        if !events::block_needs_recording(history, identity, reason) {
            return Ok(());
        }
        self.append_event(
            identity,
            instance,
            pvc,
            current_size,
            current_size,
            reason.to_string(),
            ResizeResult::Blocked,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn append_event(
        &self,
        identity: &VolumeIdentity,
        instance: &InstanceSpec,
        pvc: &str,
        old_size: u64,
        new_size: u64,
        reason: String,
        result: ResizeResult,
    ) -> anyhow::Result<()> {
        self.events
            .append(&AutoResizeEvent {
                cluster: identity.cluster.clone(),
                instance: instance.name.clone(),
                pvc_name: pvc.to_string(),
                role: identity.role,
                tablespace: identity.tablespace.clone(),
                old_size_bytes: old_size as i64,
                new_size_bytes: new_size as i64,
                reason,
                result,
                occurred_at: Utc::now(),
            })
            .await
    }
}

/// True when the provisioned size has reached the configured ceiling.
///
/// A gauge, not a gate outcome: it holds whether or not the volume is
/// currently triggered, so an operator can see a capped volume before
/// it fills.
pub fn at_configured_ceiling(limit: Option<u64>, current_size: u64) -> bool {
    limit.is_some_and(|l| current_size >= l)
}

/// History rows worth keeping per cluster: enough depth for correct
/// rolling-window math on every volume, with margin
pub fn history_cap(spec: &ClusterSpec) -> i64 {
    let max_per_day = spec
        .volumes()
        .iter()
        .map(|v| v.resize.strategy.max_actions_per_day)
        .max()
        .unwrap_or(1)
        .max(1);
    let roles = spec.volumes().len().max(1) as i64;
    max_per_day as i64 * roles * 4
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use volgres_models::quantity::GIB;
    use volgres_models::{
        ExpansionPolicy, ResizePolicy, ResizeStep, StrategyPolicy, TriggerPolicy, VolumeDiskStatus,
    };

    #[test]
    fn test_at_configured_ceiling_gauge() {
        assert!(at_configured_ceiling(Some(100 * GIB), 100 * GIB));
        assert!(at_configured_ceiling(Some(100 * GIB), 120 * GIB));
        assert!(!at_configured_ceiling(Some(100 * GIB), 99 * GIB));
        assert!(!at_configured_ceiling(None, u64::MAX));
    }

    #[test]
    fn test_ceiling_gauge_holds_while_untriggered() {
        // A volume sitting at its ceiling but only half full never
        // reaches the ceiling gate; the gauge must read true anyway.
        let policy = ResizePolicy {
            enabled: true,
            trigger: TriggerPolicy {
                usage_percent: Some(80),
                min_available: None,
            },
            expansion: ExpansionPolicy {
                step: ResizeStep::Percent(20.0),
                min_step: None,
                max_step: None,
                limit: Some(100 * GIB),
            },
            strategy: StrategyPolicy::default(),
        };
        let total = 100 * GIB;
        let disk = VolumeDiskStatus::new(total, total / 2, total / 2, 1000, 10, 990, Utc::now());

        let outcome = decision::evaluate(&GateInput {
            policy: &policy,
            disk: Some(&disk),
            wal: None,
            current_size: 100 * GIB,
            remaining_budget: 4,
            wal_gate_applies: false,
        });
        assert_eq!(outcome, Outcome::NotTriggered);
        assert!(at_configured_ceiling(policy.expansion.limit, 100 * GIB));
    }
}
