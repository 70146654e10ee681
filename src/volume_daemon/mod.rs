pub mod error;
pub mod http;

use crate::db::queries::volume as queries;
use crate::db::tables::{DeviceMapping, VolumeOperation};
use crate::device_monitor::DeviceMonitor;
use crate::nbd::NbdExportManager;
use crate::network::cloud_client::CloudApiClient;
use chrono::Utc;
use error::VolumeDaemonError;
use log::{error, warn};
use serde_json::{json, Value};
use sqlx::{MySql, Pool};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{sleep, Duration};
use uuid::Uuid;

/// Single writer to Device Mapping and NBD Export state (spec §4.4). Create
/// and delete may interleave; attach and detach are serialized through
/// `attach_lock` because the device correlation algorithm only makes sense
/// against one in-flight attach/detach at a time.
#[derive(Clone)]
pub struct VolumeDaemon {
    pool: Pool<MySql>,
    cloud: Arc<dyn CloudApiClient>,
    device_monitor: Arc<DeviceMonitor>,
    nbd: Arc<NbdExportManager>,
    hub_vm_id: String,
    attach_lock: Arc<AsyncMutex<()>>,
}

impl VolumeDaemon {
    pub fn new(
        pool: Pool<MySql>,
        cloud: Arc<dyn CloudApiClient>,
        device_monitor: Arc<DeviceMonitor>,
        nbd: Arc<NbdExportManager>,
        hub_vm_id: String,
    ) -> Self {
        Self {
            pool,
            cloud,
            device_monitor,
            nbd,
            hub_vm_id,
            attach_lock: Arc::new(AsyncMutex::new(())),
        }
    }

    async fn start_operation(
        &self,
        op_type: &str,
        volume_id: Option<String>,
        vm_id: Option<String>,
        request: Option<Value>,
    ) -> Result<String, VolumeDaemonError> {
        let op = VolumeOperation {
            id: format!("volop-{}", Uuid::new_v4()),
            op_type: op_type.to_string(),
            status: "pending".to_string(),
            volume_id,
            vm_id,
            request,
            response: None,
            error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        queries::insert_operation(&self.pool, &op)
            .await
            .map_err(|e| VolumeDaemonError::Persistence(e.to_string()))?;
        Ok(op.id)
    }

    async fn finish_operation(&self, op_id: &str, result: Result<Value, VolumeDaemonError>) {
        let (status, response, error_text) = match result {
            Ok(response) => ("completed", Some(response), None),
            Err(e) => ("failed", None, Some(e.to_string())),
        };
        if let Err(e) = queries::complete_operation(&self.pool, op_id, status, response, error_text.as_deref()).await {
            error!("volume daemon: failed to finalize operation {}: {}", op_id, e);
        }
    }

    pub async fn create(
        &self,
        name: String,
        size_bytes: i64,
        offering: String,
        zone: String,
        vm_context_id: String,
    ) -> Result<String, VolumeDaemonError> {
        let op_id = self
            .start_operation("create", None, None, Some(json!({"name": name, "size_bytes": size_bytes})))
            .await?;
        let this = self.clone();
        tokio::spawn(async move {
            queries::mark_operation_executing(&this.pool, &op_id).await.ok();
            let result = this.create_internal(&name, size_bytes, &offering, &zone, &vm_context_id).await;
            this.finish_operation(&op_id, result.map(|v| json!({"volume_id": v}))).await;
        });
        Ok(op_id)
    }

    async fn create_internal(
        &self,
        name: &str,
        size_bytes: i64,
        offering: &str,
        zone: &str,
        vm_context_id: &str,
    ) -> Result<String, VolumeDaemonError> {
        let handle = self
            .cloud
            .create_volume(name, size_bytes, offering, zone)
            .await
            .map_err(|e| VolumeDaemonError::Cloud(e.to_string()))?;
        let volume = crate::db::tables::Volume {
            id: handle.volume_id.clone(),
            name: name.to_string(),
            size_bytes: handle.size_bytes,
            vm_context_id: vm_context_id.to_string(),
            snapshot_id: None,
            snapshot_created_at: None,
            snapshot_status: "none".to_string(),
            created_at: Utc::now(),
        };
        queries::insert_volume(&self.pool, &volume)
            .await
            .map_err(|e| VolumeDaemonError::Persistence(e.to_string()))?;
        Ok(handle.volume_id)
    }

    pub async fn attach(&self, volume_id: String, vm_id: String, as_root: bool) -> Result<String, VolumeDaemonError> {
        let op_id = self
            .start_operation(
                if as_root { "attach_root" } else { "attach" },
                Some(volume_id.clone()),
                Some(vm_id.clone()),
                None,
            )
            .await?;
        let this = self.clone();
        tokio::spawn(async move {
            queries::mark_operation_executing(&this.pool, &op_id).await.ok();
            let result = this
                .attach_internal(&volume_id, &vm_id, as_root)
                .await
                .map(|mapping| json!({"device_path": mapping.host_device_path, "mode": mapping.mode}));
            this.finish_operation(&op_id, result).await;
        });
        Ok(op_id)
    }

    /// Device correlation algorithm (spec §4.4). Hub-mode attaches go
    /// through the full correlation loop and get an NBD export; failover-
    /// mode attaches assume the real cloud attach already happened (done by
    /// the caller, typically the Failover Engine) and only record the
    /// bookkeeping row with a placeholder path.
    async fn attach_internal(&self, volume_id: &str, vm_id: &str, as_root: bool) -> Result<DeviceMapping, VolumeDaemonError> {
        let volume = queries::get_volume(&self.pool, volume_id)
            .await
            .map_err(|e| VolumeDaemonError::Persistence(e.to_string()))?;

        if vm_id != self.hub_vm_id {
            let mapping = DeviceMapping {
                id: format!("dm-{}", Uuid::new_v4()),
                volume_id: volume_id.to_string(),
                mode: "failover".to_string(),
                attached_vm_id: vm_id.to_string(),
                cloud_device_index: if as_root { 0 } else { 1 },
                host_device_path: format!("remote-vm-{}", vm_id),
                persistent_device_name: None,
                symlink_path: None,
                cloud_state: "attached".to_string(),
                host_state: "n/a".to_string(),
                size_bytes: volume.size_bytes,
                last_sync_at: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            queries::insert_device_mapping(&self.pool, &mapping)
                .await
                .map_err(|e| VolumeDaemonError::Persistence(e.to_string()))?;
            return Ok(mapping);
        }

        let _guard = self.attach_lock.lock().await;
        let mut receiver = self.device_monitor.subscribe();
        let correlation_start = Utc::now();

        self.cloud
            .attach_volume(volume_id, vm_id, as_root)
            .await
            .map_err(|e| VolumeDaemonError::Cloud(e.to_string()))?;

        let event = receiver.wait_for_device(correlation_start, Duration::from_secs(30)).await;
        let event = match event {
            Some(event) => event,
            None => return Err(VolumeDaemonError::CorrelationTimeout),
        };

        let mapping = DeviceMapping {
            id: format!("dm-{}", Uuid::new_v4()),
            volume_id: volume_id.to_string(),
            mode: "hub".to_string(),
            attached_vm_id: vm_id.to_string(),
            cloud_device_index: if as_root { 0 } else { 1 },
            host_device_path: event.device_path.clone(),
            persistent_device_name: None,
            symlink_path: None,
            cloud_state: "attached".to_string(),
            host_state: "attached".to_string(),
            size_bytes: event.size_bytes,
            last_sync_at: Some(Utc::now()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        queries::insert_device_mapping(&self.pool, &mapping)
            .await
            .map_err(|e| VolumeDaemonError::Persistence(e.to_string()))?;

        let export_name = NbdExportManager::export_name_for_volume(volume_id);
        if let Err(e) = self.nbd.add_export(&export_name, &event.device_path, false).await {
            warn!("volume daemon: nbd export creation failed for {}: {}", volume_id, e);
        }

        receiver.drain_for(Duration::from_secs(1)).await;
        Ok(mapping)
    }

    pub async fn detach(&self, volume_id: String) -> Result<String, VolumeDaemonError> {
        let op_id = self.start_operation("detach", Some(volume_id.clone()), None, None).await?;
        let this = self.clone();
        tokio::spawn(async move {
            queries::mark_operation_executing(&this.pool, &op_id).await.ok();
            let result = this.detach_internal(&volume_id).await.map(|_| json!({}));
            this.finish_operation(&op_id, result).await;
        });
        Ok(op_id)
    }

    /// Idempotent: a volume with no mapping row is already detached.
    async fn detach_internal(&self, volume_id: &str) -> Result<(), VolumeDaemonError> {
        let mapping = queries::get_mapping_for_volume(&self.pool, volume_id)
            .await
            .map_err(|e| VolumeDaemonError::Persistence(e.to_string()))?;
        let Some(mapping) = mapping else { return Ok(()) };

        let _guard = self.attach_lock.lock().await;
        self.cloud
            .detach_volume(volume_id)
            .await
            .map_err(|e| VolumeDaemonError::Cloud(e.to_string()))?;

        if mapping.mode == "hub" {
            let export_name = NbdExportManager::export_name_for_volume(volume_id);
            if let Err(e) = self.nbd.remove_export(&export_name).await {
                warn!("volume daemon: failed to remove nbd export for {}: {}", volume_id, e);
            }
        }

        queries::delete_mapping(&self.pool, &mapping.id)
            .await
            .map_err(|e| VolumeDaemonError::Persistence(e.to_string()))
    }

    pub async fn delete(&self, volume_id: String) -> Result<String, VolumeDaemonError> {
        let op_id = self.start_operation("delete", Some(volume_id.clone()), None, None).await?;
        let this = self.clone();
        tokio::spawn(async move {
            queries::mark_operation_executing(&this.pool, &op_id).await.ok();
            let result = this.delete_internal(&volume_id).await.map(|_| json!({}));
            this.finish_operation(&op_id, result).await;
        });
        Ok(op_id)
    }

    /// If attached, detach first (and remove export) then delete — ends in
    /// the same state as detach-then-delete called separately (spec §8
    /// property 6).
    async fn delete_internal(&self, volume_id: &str) -> Result<(), VolumeDaemonError> {
        self.detach_internal(volume_id).await?;
        self.cloud
            .delete_volume(volume_id)
            .await
            .map_err(|e| VolumeDaemonError::Cloud(e.to_string()))
    }

    pub fn hub_vm_id(&self) -> &str {
        &self.hub_vm_id
    }

    pub async fn get_operation(&self, op_id: &str) -> Result<VolumeOperation, VolumeDaemonError> {
        queries::get_operation(&self.pool, op_id)
            .await
            .map_err(|_| VolumeDaemonError::OperationNotFound(op_id.to_string()))
    }

    pub async fn cleanup_test_failover(
        &self,
        test_vm_id: String,
        volume_id: String,
        delete_vm: bool,
        force: bool,
    ) -> Result<String, VolumeDaemonError> {
        let op_id = self
            .start_operation(
                "cleanup_test_failover",
                Some(volume_id.clone()),
                Some(test_vm_id.clone()),
                Some(json!({"delete_vm": delete_vm, "force": force})),
            )
            .await?;
        let this = self.clone();
        tokio::spawn(async move {
            queries::mark_operation_executing(&this.pool, &op_id).await.ok();
            let result = this
                .cleanup_test_failover_internal(&test_vm_id, &volume_id, delete_vm, force)
                .await
                .map(|_| json!({}));
            this.finish_operation(&op_id, result).await;
        });
        Ok(op_id)
    }

    async fn cleanup_test_failover_internal(
        &self,
        test_vm_id: &str,
        volume_id: &str,
        delete_vm: bool,
        force: bool,
    ) -> Result<(), VolumeDaemonError> {
        let state = self
            .cloud
            .vm_state(test_vm_id)
            .await
            .map_err(|e| VolumeDaemonError::Cloud(e.to_string()))?;
        if state == crate::network::cloud_client::CloudVmState::Running {
            if !force {
                return Err(VolumeDaemonError::Cloud(format!(
                    "test vm {} is still running and force was not requested",
                    test_vm_id
                )));
            }
            self.cloud
                .power_off(test_vm_id, true)
                .await
                .map_err(|e| VolumeDaemonError::Cloud(e.to_string()))?;
        }

        self.detach_internal(volume_id).await?;

        if delete_vm {
            self.cloud
                .delete_vm(test_vm_id)
                .await
                .map_err(|e| VolumeDaemonError::Cloud(e.to_string()))?;
        }

        self.attach_internal(volume_id, &self.hub_vm_id, false).await?;
        Ok(())
    }

    pub async fn track_snapshot(&self, volume_id: &str, snapshot_id: &str) -> Result<(), VolumeDaemonError> {
        queries::record_snapshot(&self.pool, volume_id, snapshot_id)
            .await
            .map_err(|e| VolumeDaemonError::Persistence(e.to_string()))
    }

    pub async fn get_vm_snapshots(&self, vm_context_id: &str) -> Result<Vec<crate::db::tables::Volume>, VolumeDaemonError> {
        let volumes = queries::list_volumes_for_context(&self.pool, vm_context_id)
            .await
            .map_err(|e| VolumeDaemonError::Persistence(e.to_string()))?;
        Ok(volumes.into_iter().filter(|v| v.snapshot_id.is_some()).collect())
    }

    pub async fn clear_vm_snapshots(&self, vm_context_id: &str) -> Result<(), VolumeDaemonError> {
        for volume in self.get_vm_snapshots(vm_context_id).await? {
            queries::mark_rollback_complete(&self.pool, &volume.id)
                .await
                .map_err(|e| VolumeDaemonError::Persistence(e.to_string()))?;
        }
        Ok(())
    }

    pub async fn wait_for_completion(&self, op_id: &str, timeout: Duration) -> Result<VolumeOperation, VolumeDaemonError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let op = queries::get_operation(&self.pool, op_id)
                .await
                .map_err(|_| VolumeDaemonError::OperationNotFound(op_id.to_string()))?;
            if op.status == "completed" || op.status == "failed" {
                return Ok(op);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(VolumeDaemonError::WaitTimeout(op_id.to_string()));
            }
            sleep(Duration::from_millis(250)).await;
        }
    }
}
