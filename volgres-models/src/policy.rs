//! User-declared resize policies and the cluster spec that carries them

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::quantity::{self, ResizeStep};
use crate::VolumeRole;

/// When to start evaluating a resize. The two thresholds are
/// OR-combined; with neither set, a default usage threshold applies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TriggerPolicy {
    /// Percent-full threshold (1-99)
    #[serde(default)]
    pub usage_percent: Option<u8>,
    /// Absolute free-space floor, e.g. "5Gi"
    #[serde(default, with = "quantity::opt_bytes")]
    pub min_available: Option<u64>,
}

/// Default usage threshold applied when a trigger clause sets neither
/// condition.
pub const DEFAULT_USAGE_PERCENT: u8 = 80;

impl TriggerPolicy {
    /// Effective usage threshold, falling back to the default when no
    /// condition is configured at all.
    pub fn effective_usage_percent(&self) -> Option<u8> {
        if self.usage_percent.is_none() && self.min_available.is_none() {
            Some(DEFAULT_USAGE_PERCENT)
        } else {
            self.usage_percent
        }
    }
}

/// How much to grow by, and how far growth may go.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpansionPolicy {
    /// "20%" or an absolute quantity like "10Gi"
    pub step: ResizeStep,
    /// Floor on a percentage step's delta. Ignored for absolute steps
    /// (documented behavior, warned at admission time).
    #[serde(default, with = "quantity::opt_bytes")]
    pub min_step: Option<u64>,
    /// Ceiling on a percentage step's delta. Ignored for absolute steps.
    #[serde(default, with = "quantity::opt_bytes")]
    pub max_step: Option<u64>,
    /// Absolute size ceiling for the volume itself
    #[serde(default, with = "quantity::opt_bytes")]
    pub limit: Option<u64>,
}

fn default_max_actions_per_day() -> u32 {
    4
}

/// Rate limiting and WAL safety for a volume's resize actions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategyPolicy {
    /// Resize actions permitted per rolling 24-hour window
    #[serde(default = "default_max_actions_per_day")]
    pub max_actions_per_day: u32,
    #[serde(default)]
    pub wal_safety: Option<WalSafetyPolicy>,
}

impl Default for StrategyPolicy {
    fn default() -> Self {
        Self {
            max_actions_per_day: default_max_actions_per_day(),
            wal_safety: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Checks that keep a resize from papering over an archiver or
/// replication-slot failure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalSafetyPolicy {
    /// Block when the archiver's last failure is newer than its last
    /// success
    #[serde(default = "default_true")]
    pub require_archive_healthy: bool,
    /// Block when more than this many WAL segments await archival
    #[serde(default)]
    pub max_pending_archive_files: Option<u64>,
    /// Block when inactive replication slots retain more than this
    #[serde(default, with = "quantity::opt_bytes")]
    pub max_slot_retention_bytes: Option<u64>,
    /// Required for a data volume with no separate WAL volume: the user
    /// acknowledges that growing the single volume can mask WAL
    /// failures
    #[serde(default)]
    pub acknowledge_single_volume_risk: bool,
}

impl Default for WalSafetyPolicy {
    fn default() -> Self {
        Self {
            require_archive_healthy: true,
            max_pending_archive_files: None,
            max_slot_retention_bytes: None,
            acknowledge_single_volume_risk: false,
        }
    }
}

/// The full per-volume resize policy. Immutable during a pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResizePolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub trigger: TriggerPolicy,
    pub expansion: ExpansionPolicy,
    #[serde(default)]
    pub strategy: StrategyPolicy,
}

/// One volume of the cluster: where it is mounted and how it may grow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VolumeSpec {
    /// Mount path inside the instance pod, probed by the stat sampler
    pub mount: PathBuf,
    pub resize: ResizePolicy,
}

/// A named tablespace volume
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TablespaceSpec {
    pub name: String,
    pub mount: PathBuf,
    pub resize: ResizePolicy,
}

/// One database instance of the cluster
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceSpec {
    pub name: String,
    /// Connection string for WAL health queries; health is "unknown"
    /// without one
    #[serde(default)]
    pub connection_string: Option<String>,
    /// Override for the archive-status directory; defaults to
    /// `<data mount>/pg_wal/archive_status`
    #[serde(default)]
    pub archive_status_dir: Option<PathBuf>,
}

fn default_namespace() -> String {
    "volgres".to_string()
}

/// The user-facing configuration surface: read-only to the engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterSpec {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub instances: Vec<InstanceSpec>,
    pub data: VolumeSpec,
    #[serde(default)]
    pub wal: Option<VolumeSpec>,
    #[serde(default)]
    pub tablespaces: Vec<TablespaceSpec>,
}

impl ClusterSpec {
    /// True when WAL lives on its own volume. Without one, the data
    /// volume carries WAL and the single-volume safety hazard applies.
    pub fn has_separate_wal(&self) -> bool {
        self.wal.is_some()
    }

    /// All volume roles of this cluster, data first
    pub fn volumes(&self) -> Vec<VolumeRef<'_>> {
        let mut out = vec![VolumeRef {
            role: VolumeRole::Data,
            tablespace: None,
            mount: &self.data.mount,
            resize: &self.data.resize,
        }];
        if let Some(wal) = &self.wal {
            out.push(VolumeRef {
                role: VolumeRole::Wal,
                tablespace: None,
                mount: &wal.mount,
                resize: &wal.resize,
            });
        }
        for ts in &self.tablespaces {
            out.push(VolumeRef {
                role: VolumeRole::Tablespace,
                tablespace: Some(ts.name.as_str()),
                mount: &ts.mount,
                resize: &ts.resize,
            });
        }
        out
    }

    pub fn archive_status_dir(&self, instance: &InstanceSpec) -> PathBuf {
        instance
            .archive_status_dir
            .clone()
            .unwrap_or_else(|| self.data.mount.join("pg_wal").join("archive_status"))
    }
}

/// Borrowed view over one volume of a cluster, uniform across roles
#[derive(Debug, Clone, Copy)]
pub struct VolumeRef<'a> {
    pub role: VolumeRole,
    pub tablespace: Option<&'a str>,
    pub mount: &'a std::path::Path,
    pub resize: &'a ResizePolicy,
}

impl VolumeRef<'_> {
    pub fn identity(&self, cluster: &str) -> crate::VolumeIdentity {
        crate::VolumeIdentity::new(cluster, self.role, self.tablespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantity::GIB;

    fn sample_policy() -> ResizePolicy {
        ResizePolicy {
            enabled: true,
            trigger: TriggerPolicy {
                usage_percent: Some(80),
                min_available: None,
            },
            expansion: ExpansionPolicy {
                step: ResizeStep::parse("20%").unwrap(),
                min_step: Some(GIB),
                max_step: Some(500 * GIB),
                limit: Some(100 * GIB),
            },
            strategy: StrategyPolicy::default(),
        }
    }

    #[test]
    fn test_policy_serde_round_trip() {
        let policy = sample_policy();
        let json = serde_json::to_string(&policy).unwrap();
        let parsed: ResizePolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(policy, parsed);
    }

    #[test]
    fn test_policy_quantity_strings() {
        let json = r#"{
            "enabled": true,
            "trigger": { "usage_percent": 85, "min_available": "5Gi" },
            "expansion": { "step": "1Gi", "limit": "100Gi" },
            "strategy": { "max_actions_per_day": 2 }
        }"#;
        let policy: ResizePolicy = serde_json::from_str(json).unwrap();
        assert_eq!(policy.trigger.min_available, Some(5 * GIB));
        assert_eq!(policy.expansion.step, ResizeStep::Absolute(GIB));
        assert_eq!(policy.expansion.limit, Some(100 * GIB));
        assert_eq!(policy.strategy.max_actions_per_day, 2);
    }

    #[test]
    fn test_trigger_default_threshold() {
        let trigger = TriggerPolicy::default();
        assert_eq!(trigger.effective_usage_percent(), Some(DEFAULT_USAGE_PERCENT));

        let trigger = TriggerPolicy {
            usage_percent: None,
            min_available: Some(GIB),
        };
        // An explicit min_available suppresses the default percent
        assert_eq!(trigger.effective_usage_percent(), None);
    }

    #[test]
    fn test_cluster_spec_volumes() {
        let spec = ClusterSpec {
            name: "prod".to_string(),
            namespace: "volgres".to_string(),
            instances: vec![InstanceSpec {
                name: "prod-1".to_string(),
                connection_string: None,
                archive_status_dir: None,
            }],
            data: VolumeSpec {
                mount: PathBuf::from("/var/lib/postgresql/data"),
                resize: sample_policy(),
            },
            wal: None,
            tablespaces: vec![],
        };

        assert!(!spec.has_separate_wal());
        assert_eq!(spec.volumes().len(), 1);
        assert_eq!(
            spec.archive_status_dir(&spec.instances[0]),
            PathBuf::from("/var/lib/postgresql/data/pg_wal/archive_status")
        );
    }
}
