//! Admission-time validation of resize policies.
//!
//! Rejections stop a policy outright; warnings flag configurations that
//! are legal but permanently inert or partially ignored. A policy that
//! somehow reaches the engine with errors is skipped per volume, without
//! affecting sibling volumes.

use volgres_models::{ClusterSpec, ResizePolicy, ResizeStep, VolumeRef, VolumeRole};

/// Validation findings for one volume
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VolumeFindings {
    pub volume: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl VolumeFindings {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Findings for a whole cluster spec
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub volumes: Vec<VolumeFindings>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.volumes.iter().all(|v| v.is_valid())
    }

    pub fn errors(&self) -> impl Iterator<Item = (&str, &str)> {
        self.volumes
            .iter()
            .flat_map(|v| v.errors.iter().map(move |e| (v.volume.as_str(), e.as_str())))
    }

    pub fn warnings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.volumes.iter().flat_map(|v| {
            v.warnings
                .iter()
                .map(move |w| (v.volume.as_str(), w.as_str()))
        })
    }
}

/// Validate every volume of a cluster spec.
pub fn validate_cluster_spec(spec: &ClusterSpec) -> ValidationReport {
    ValidationReport {
        volumes: spec
            .volumes()
            .iter()
            .map(|vol| validate_volume(spec, vol))
            .collect(),
    }
}

/// Validate a single volume's policy.
pub fn validate_volume(spec: &ClusterSpec, vol: &VolumeRef<'_>) -> VolumeFindings {
    let mut findings = VolumeFindings {
        volume: vol.identity(&spec.name).to_string(),
        ..Default::default()
    };
    let single_volume_hazard = vol.role == VolumeRole::Data && !spec.has_separate_wal();
    validate_policy(vol.resize, single_volume_hazard, &mut findings);
    findings
}

fn validate_policy(policy: &ResizePolicy, single_volume_hazard: bool, out: &mut VolumeFindings) {
    if let Some(pct) = policy.trigger.usage_percent {
        if !(1..=99).contains(&pct) {
            out.errors
                .push(format!("usage_percent must be within 1-99, got {}", pct));
        }
    }

    if policy.expansion.step.is_zero() {
        // An explicit zero means "do nothing"; substituting a default
        // would misread the user's intent, so reject instead.
        out.errors
            .push("step of zero is not a valid resize step; disable the policy instead".to_string());
    }

    match (policy.expansion.min_step, policy.expansion.max_step) {
        (Some(min), Some(max)) if min > max => {
            out.errors
                .push(format!("min_step ({}) exceeds max_step ({})", min, max));
        }
        _ => {}
    }

    if policy.enabled && single_volume_hazard {
        let acknowledged = policy
            .strategy
            .wal_safety
            .as_ref()
            .is_some_and(|s| s.acknowledge_single_volume_risk);
        if !acknowledged {
            out.errors.push(
                "auto-resize on a single-volume cluster can mask WAL failures; \
                 set wal_safety.acknowledge_single_volume_risk to enable it"
                    .to_string(),
            );
        }
    }

    if policy.enabled && policy.strategy.max_actions_per_day == 0 {
        out.warnings.push(
            "max_actions_per_day is 0 while the policy is enabled; \
             every trigger will be rate-limited"
                .to_string(),
        );
    }

    if matches!(policy.expansion.step, ResizeStep::Absolute(_))
        && (policy.expansion.min_step.is_some() || policy.expansion.max_step.is_some())
    {
        out.warnings.push(
            "min_step/max_step only bound percentage steps and are ignored \
             for an absolute step"
                .to_string(),
        );
    }
}
