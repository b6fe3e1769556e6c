use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod policy;
pub mod quantity;

pub use policy::{
    ClusterSpec, ExpansionPolicy, InstanceSpec, ResizePolicy, StrategyPolicy, TablespaceSpec,
    TriggerPolicy, VolumeRef, VolumeSpec, WalSafetyPolicy,
};
pub use quantity::ResizeStep;

/// The kind of persistent volume a Postgres instance mounts
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "volume_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VolumeRole {
    Data,
    Wal,
    Tablespace,
}

impl VolumeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeRole::Data => "data",
            VolumeRole::Wal => "wal",
            VolumeRole::Tablespace => "tablespace",
        }
    }
}

impl std::fmt::Display for VolumeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The logical identity the resize budget is keyed on.
///
/// Deliberately (cluster, role, tablespace) rather than the physical PVC
/// name: a volume replaced after failover keeps the same identity and
/// therefore the same rolling-window budget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct VolumeIdentity {
    pub cluster: String,
    pub role: VolumeRole,
    pub tablespace: Option<String>,
}

impl VolumeIdentity {
    pub fn new(cluster: &str, role: VolumeRole, tablespace: Option<&str>) -> Self {
        Self {
            cluster: cluster.to_string(),
            role,
            tablespace: tablespace.map(|t| t.to_string()),
        }
    }
}

impl std::fmt::Display for VolumeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.tablespace {
            Some(ts) => write!(f, "{}/{}/{}", self.cluster, self.role, ts),
            None => write!(f, "{}/{}", self.cluster, self.role),
        }
    }
}

/// Conventional PVC name for a volume of an instance
pub fn pvc_name(instance: &str, role: VolumeRole, tablespace: Option<&str>) -> String {
    match role {
        VolumeRole::Data => format!("{}-data", instance),
        VolumeRole::Wal => format!("{}-wal", instance),
        VolumeRole::Tablespace => {
            format!("{}-tbs-{}", instance, tablespace.unwrap_or("unnamed"))
        }
    }
}

/// Filesystem statistics for one volume of one instance.
///
/// Replaced wholesale on every probe cycle; the engine never merges
/// fields across cycles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VolumeDiskStatus {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
    pub inodes_total: u64,
    pub inodes_used: u64,
    pub inodes_free: u64,
    /// Derived: used / total * 100, 0 when total is 0
    pub percent_used: f64,
    pub collected_at: DateTime<Utc>,
}

impl VolumeDiskStatus {
    pub fn new(
        total_bytes: u64,
        used_bytes: u64,
        available_bytes: u64,
        inodes_total: u64,
        inodes_used: u64,
        inodes_free: u64,
        collected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            total_bytes,
            used_bytes,
            available_bytes,
            inodes_total,
            inodes_used,
            inodes_free,
            percent_used: percent_used(used_bytes, total_bytes),
            collected_at,
        }
    }
}

/// `used / total * 100`, defined as 0 for an empty filesystem
pub fn percent_used(used_bytes: u64, total_bytes: u64) -> f64 {
    if total_bytes == 0 {
        0.0
    } else {
        used_bytes as f64 / total_bytes as f64 * 100.0
    }
}

/// A physical replication slot that no consumer is draining
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InactiveSlot {
    pub name: String,
    /// Distance between the current WAL write position and the slot's
    /// restart position
    pub retained_bytes: u64,
}

/// WAL health for one instance, refreshed alongside disk status.
///
/// Each field is `None` when its sub-check failed: "unknown", never a
/// false-safe "healthy". Unknown checks let a resize through but mark
/// the resulting action as unverified.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalHealthInfo {
    pub archive_healthy: Option<bool>,
    pub pending_archive_files: Option<u64>,
    pub inactive_slots: Option<Vec<InactiveSlot>>,
    pub collected_at: DateTime<Utc>,
}

impl WalHealthInfo {
    /// Summed retained bytes across inactive slots, None when unknown
    pub fn inactive_slot_retention(&self) -> Option<u64> {
        self.inactive_slots
            .as_ref()
            .map(|slots| slots.iter().map(|s| s.retained_bytes).sum())
    }

    /// True when every sub-check failed and nothing can be verified
    pub fn is_entirely_unknown(&self) -> bool {
        self.archive_healthy.is_none()
            && self.pending_archive_files.is_none()
            && self.inactive_slots.is_none()
    }
}

/// Result of an attempted resize action
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "resize_result", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ResizeResult {
    Success,
    Failed,
    Blocked,
}

impl std::fmt::Display for ResizeResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResizeResult::Success => f.write_str("success"),
            ResizeResult::Failed => f.write_str("failed"),
            ResizeResult::Blocked => f.write_str("blocked"),
        }
    }
}

/// Immutable audit record for one attempted resize decision.
///
/// The persisted event list is the single source of truth for the
/// rate-limit ledger; there is no in-memory counter anywhere.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct AutoResizeEvent {
    pub cluster: String,
    pub instance: String,
    /// Physical PVC name at the time of the event
    pub pvc_name: String,
    pub role: VolumeRole,
    pub tablespace: Option<String>,
    pub old_size_bytes: i64,
    pub new_size_bytes: i64,
    pub reason: String,
    pub result: ResizeResult,
    pub occurred_at: DateTime<Utc>,
}

impl AutoResizeEvent {
    pub fn identity(&self) -> VolumeIdentity {
        VolumeIdentity {
            cluster: self.cluster.clone(),
            role: self.role,
            tablespace: self.tablespace.clone(),
        }
    }
}

/// Read-only observability projection for one logical volume identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VolumeObservation {
    pub identity: VolumeIdentity,
    pub instance: String,
    pub pvc_name: String,
    pub percent_used: Option<f64>,
    pub current_size_bytes: Option<u64>,
    pub at_limit: bool,
    /// Reason the last evaluation terminated without a patch, if any
    pub blocked_reason: Option<String>,
    pub remaining_budget: u32,
    pub success_count: u64,
    pub failed_count: u64,
    pub blocked_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_used() {
        assert_eq!(percent_used(0, 0), 0.0);
        assert_eq!(percent_used(50, 100), 50.0);
        assert_eq!(percent_used(100, 100), 100.0);
    }

    #[test]
    fn test_volume_identity_display() {
        let id = VolumeIdentity::new("prod", VolumeRole::Wal, None);
        assert_eq!(id.to_string(), "prod/wal");

        let id = VolumeIdentity::new("prod", VolumeRole::Tablespace, Some("analytics"));
        assert_eq!(id.to_string(), "prod/tablespace/analytics");
    }

    #[test]
    fn test_pvc_name() {
        assert_eq!(pvc_name("prod-1", VolumeRole::Data, None), "prod-1-data");
        assert_eq!(pvc_name("prod-1", VolumeRole::Wal, None), "prod-1-wal");
        assert_eq!(
            pvc_name("prod-1", VolumeRole::Tablespace, Some("analytics")),
            "prod-1-tbs-analytics"
        );
    }

    #[test]
    fn test_wal_health_retention_sum() {
        let info = WalHealthInfo {
            archive_healthy: Some(true),
            pending_archive_files: Some(0),
            inactive_slots: Some(vec![
                InactiveSlot {
                    name: "standby_a".to_string(),
                    retained_bytes: 100,
                },
                InactiveSlot {
                    name: "standby_b".to_string(),
                    retained_bytes: 50,
                },
            ]),
            collected_at: Utc::now(),
        };
        assert_eq!(info.inactive_slot_retention(), Some(150));
        assert!(!info.is_entirely_unknown());
    }

    #[test]
    fn test_wal_health_unknown() {
        let info = WalHealthInfo {
            archive_healthy: None,
            pending_archive_files: None,
            inactive_slots: None,
            collected_at: Utc::now(),
        };
        assert_eq!(info.inactive_slot_retention(), None);
        assert!(info.is_entirely_unknown());
    }

    #[test]
    fn test_event_serialization() {
        let event = AutoResizeEvent {
            cluster: "prod".to_string(),
            instance: "prod-1".to_string(),
            pvc_name: "prod-1-data".to_string(),
            role: VolumeRole::Data,
            tablespace: None,
            old_size_bytes: 2 * 1024 * 1024 * 1024,
            new_size_bytes: 3 * 1024 * 1024 * 1024,
            reason: "usage 82.0% >= 80%".to_string(),
            result: ResizeResult::Success,
            occurred_at: Utc::now(),
        };

        let json = serde_json::to_string(&event).unwrap();
        let parsed: AutoResizeEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, parsed);
        assert_eq!(parsed.identity(), VolumeIdentity::new("prod", VolumeRole::Data, None));
    }
}
