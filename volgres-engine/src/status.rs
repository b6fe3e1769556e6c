//! Instance status collection: disk stats plus WAL health, refreshed
//! wholesale on every probe cycle.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;

use volgres_models::{
    ClusterSpec, InstanceSpec, VolumeDiskStatus, VolumeIdentity, WalHealthInfo,
};

use crate::{sampler, wal};

/// Everything the engine reads about one instance in one pass.
///
/// A volume whose probe failed is simply absent from `disk`; absence is
/// how "stale/unknown" is expressed, so a failed probe can never be
/// mistaken for a healthy one.
#[derive(Debug, Clone)]
pub struct InstanceStatus {
    pub instance: String,
    pub disk: HashMap<VolumeIdentity, VolumeDiskStatus>,
    pub wal: Option<WalHealthInfo>,
}

impl InstanceStatus {
    /// Disk status for a volume, only if fresher than the window
    pub fn fresh_disk(
        &self,
        identity: &VolumeIdentity,
        now: DateTime<Utc>,
        freshness: chrono::Duration,
    ) -> Option<&VolumeDiskStatus> {
        self.disk
            .get(identity)
            .filter(|d| now - d.collected_at <= freshness)
    }

    /// WAL health, only if fresher than the window
    pub fn fresh_wal(
        &self,
        now: DateTime<Utc>,
        freshness: chrono::Duration,
    ) -> Option<&WalHealthInfo> {
        self.wal
            .as_ref()
            .filter(|w| now - w.collected_at <= freshness)
    }
}

/// Probe one instance: every volume mount plus WAL health. Probe
/// failures degrade individual fields, never the whole structure.
pub async fn probe_instance(
    spec: &ClusterSpec,
    instance: &InstanceSpec,
    probe_timeout: Duration,
) -> InstanceStatus {
    let mut disk = HashMap::new();

    for vol in spec.volumes() {
        let identity = vol.identity(&spec.name);
        match sampler::sample_mount_timeout(vol.mount.to_path_buf(), probe_timeout).await {
            Ok(sample) => {
                disk.insert(
                    identity,
                    VolumeDiskStatus::new(
                        sample.total_bytes,
                        sample.used_bytes,
                        sample.available_bytes,
                        sample.inodes_total,
                        sample.inodes_used,
                        sample.inodes_free,
                        Utc::now(),
                    ),
                );
            }
            Err(e) => {
                warn!(
                    volume = %identity,
                    instance = %instance.name,
                    "disk probe failed, status stays stale until the next cycle: {}", e
                );
            }
        }
    }

    let client = match &instance.connection_string {
        Some(conn) => match wal::connect(conn, probe_timeout).await {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(
                    instance = %instance.name,
                    "health connection failed, WAL state unknown: {}", e
                );
                None
            }
        },
        None => None,
    };

    let wal = wal::evaluate(client.as_ref(), &spec.archive_status_dir(instance)).await;

    InstanceStatus {
        instance: instance.name.clone(),
        disk,
        wal: Some(wal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use volgres_models::VolumeRole;

    #[test]
    fn test_fresh_disk_filters_stale_status() {
        let id = VolumeIdentity::new("prod", VolumeRole::Data, None);
        let now = Utc::now();
        let stale_at = now - chrono::Duration::minutes(10);

        let mut disk = HashMap::new();
        disk.insert(
            id.clone(),
            VolumeDiskStatus::new(100, 50, 50, 10, 1, 9, stale_at),
        );
        let status = InstanceStatus {
            instance: "prod-1".to_string(),
            disk,
            wal: None,
        };

        assert!(status
            .fresh_disk(&id, now, chrono::Duration::minutes(2))
            .is_none());
        assert!(status
            .fresh_disk(&id, now, chrono::Duration::minutes(15))
            .is_some());
    }
}
