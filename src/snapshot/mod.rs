pub mod error;

use crate::db::queries::volume as queries;
use crate::network::cloud_client::CloudApiClient;
use chrono::Utc;
use error::SnapshotError;
use log::{error, info, warn};
use serde::Serialize;
use sqlx::{MySql, Pool};
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct VolumeSnapshotResult {
    pub volume_id: String,
    pub snapshot_id: Option<String>,
    pub error: Option<String>,
}

/// Creates, rolls back, and cleans up cloud snapshots for every volume a VM
/// context owns, using the Volume row as the authoritative store for
/// snapshot state (spec §4.5, §9 open question).
pub struct SnapshotService {
    pool: Pool<MySql>,
    cloud: Arc<dyn CloudApiClient>,
}

impl SnapshotService {
    pub fn new(pool: Pool<MySql>, cloud: Arc<dyn CloudApiClient>) -> Self {
        Self { pool, cloud }
    }

    /// Partial success is reported per-volume; only a total failure (every
    /// volume erroring) is surfaced as `Err`.
    pub async fn create_all_volume_snapshots(
        &self,
        vm_context_id: &str,
    ) -> Result<Vec<VolumeSnapshotResult>, SnapshotError> {
        let volumes = queries::list_volumes_for_context(&self.pool, vm_context_id)
            .await
            .map_err(|e| SnapshotError::Persistence(e.to_string()))?;

        let mut results = Vec::with_capacity(volumes.len());
        let unix_now = Utc::now().timestamp();

        for volume in &volumes {
            let snapshot_name = format!("multi-test-failover-{}-{}", volume.id, unix_now);
            match self.cloud.create_snapshot(&volume.id, &snapshot_name).await {
                Ok(snapshot_id) => {
                    if let Err(e) = queries::record_snapshot(&self.pool, &volume.id, &snapshot_id).await {
                        error!("snapshot service: failed to persist snapshot for {}: {}", volume.id, e);
                        results.push(VolumeSnapshotResult {
                            volume_id: volume.id.clone(),
                            snapshot_id: None,
                            error: Some(e.to_string()),
                        });
                        continue;
                    }
                    info!("snapshot service: created {} for volume {}", snapshot_id, volume.id);
                    results.push(VolumeSnapshotResult {
                        volume_id: volume.id.clone(),
                        snapshot_id: Some(snapshot_id),
                        error: None,
                    });
                }
                Err(e) => {
                    warn!("snapshot service: failed to snapshot volume {}: {}", volume.id, e);
                    results.push(VolumeSnapshotResult {
                        volume_id: volume.id.clone(),
                        snapshot_id: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        if !volumes.is_empty() && results.iter().all(|r| r.snapshot_id.is_none()) {
            return Err(SnapshotError::TotalFailure(vm_context_id.to_string()));
        }
        Ok(results)
    }

    pub async fn rollback_all_volume_snapshots(&self, vm_context_id: &str) -> Result<(), SnapshotError> {
        let volumes = queries::list_volumes_for_context(&self.pool, vm_context_id)
            .await
            .map_err(|e| SnapshotError::Persistence(e.to_string()))?;

        for volume in volumes {
            let Some(snapshot_id) = &volume.snapshot_id else { continue };
            self.cloud
                .revert_snapshot(&volume.id, snapshot_id)
                .await
                .map_err(|e| SnapshotError::Cloud(e.to_string()))?;
            queries::mark_rollback_complete(&self.pool, &volume.id)
                .await
                .map_err(|e| SnapshotError::Persistence(e.to_string()))?;
        }
        Ok(())
    }

    /// Reverts then deletes every tracked snapshot and clears tracking.
    pub async fn cleanup_all_volume_snapshots(&self, vm_context_id: &str) -> Result<(), SnapshotError> {
        self.rollback_all_volume_snapshots(vm_context_id).await?;

        let volumes = queries::list_volumes_for_context(&self.pool, vm_context_id)
            .await
            .map_err(|e| SnapshotError::Persistence(e.to_string()))?;
        for volume in volumes {
            let Some(snapshot_id) = &volume.snapshot_id else { continue };
            self.cloud
                .delete_snapshot(snapshot_id)
                .await
                .map_err(|e| SnapshotError::Cloud(e.to_string()))?;
            queries::clear_snapshot(&self.pool, &volume.id)
                .await
                .map_err(|e| SnapshotError::Persistence(e.to_string()))?;
        }
        Ok(())
    }
}
