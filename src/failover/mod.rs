pub mod error;
pub mod model;

use crate::db::queries::{failover as fqueries, vm_context, volume as vqueries};
use crate::db::tables::FailoverJob;
use crate::error_sanitizer;
use crate::job_log::JobLog;
use crate::network::cloud_client::{CloudApiClient, CloudVmSpec, CloudVmState};
use crate::network::sna_client::SnaClient;
use crate::snapshot::SnapshotService;
use crate::volume_daemon::VolumeDaemon;
use chrono::Utc;
use error::FailoverError;
use log::{info, warn};
use model::{derive_network_strategy, destination_vm_name, FailoverConfig, FailoverType};
use serde::Deserialize;
use serde_json::json;
use sqlx::{MySql, Pool};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct CloudConfigRef {
    service_offering_id: String,
    template_id: String,
    zone_id: String,
    #[serde(default)]
    production_network_id: Option<String>,
    #[serde(default)]
    isolated_network_id: Option<String>,
}

/// Drives the nine-phase failover workflow (spec §4.6): quiesce the source,
/// snapshot every volume, build a destination VM, rearrange attachments
/// root-first, then power it on. Every phase is one Job Log step; the first
/// failure aborts the workflow and is handed to the error sanitizer by the
/// caller.
pub struct FailoverEngine {
    pool: Pool<MySql>,
    job_log: Arc<JobLog>,
    cloud: Arc<dyn CloudApiClient>,
    sna: Arc<SnaClient>,
    volume_daemon: Arc<VolumeDaemon>,
    snapshot: Arc<SnapshotService>,
    power_off_timeout: Duration,
    volume_attach_timeout: Duration,
}

impl FailoverEngine {
    pub fn new(
        pool: Pool<MySql>,
        job_log: Arc<JobLog>,
        cloud: Arc<dyn CloudApiClient>,
        sna: Arc<SnaClient>,
        volume_daemon: Arc<VolumeDaemon>,
        snapshot: Arc<SnapshotService>,
        power_off_timeout: Duration,
        volume_attach_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            job_log,
            cloud,
            sna,
            volume_daemon,
            snapshot,
            power_off_timeout,
            volume_attach_timeout,
        }
    }

    pub async fn execute(&self, config: FailoverConfig) -> Result<FailoverJob, FailoverError> {
        let handle = self
            .job_log
            .start_job(
                "failover",
                config.failover_type.as_str(),
                &config.requested_by,
                Some(&config.vm_context_id),
                None,
                "failover",
            )
            .await
            .map_err(|e| FailoverError::Persistence(e.to_string()))?;

        let result = self.run(&config).await;

        // Deferred finalizer (spec §4.6): on failure, the raw error never
        // leaves this engine — only the Sanitizer's operator-facing summary
        // is persisted, durably, on the VM context (spec §4.11).
        match &result {
            Ok(_) => self.job_log.end_job(&handle, "completed", None).await,
            Err(e) => {
                let sanitized = error_sanitizer::sanitize("failover", &e.to_string());
                if let Err(pe) = vm_context::record_operation_summary(
                    &self.pool,
                    &config.vm_context_id,
                    serde_json::to_value(&sanitized).unwrap_or_else(|_| json!({})),
                )
                .await
                {
                    warn!(
                        "failover: failed to persist sanitized failure summary for context {}: {}",
                        config.vm_context_id, pe
                    );
                }
                self.job_log.end_job(&handle, "failed", Some(&e.to_string())).await
            }
        }

        result
    }

    async fn run(&self, config: &FailoverConfig) -> Result<FailoverJob, FailoverError> {
        let ctx_id = config.vm_context_id.clone();

        // Phase 1: validation.
        let ctx = vm_context::get_context(&self.pool, &ctx_id)
            .await
            .map_err(|e| FailoverError::Validation(e.to_string()))?;
        if !config.skip_validation {
            self.validate(&ctx_id, &ctx).await?;
        }
        let cloud_cfg: CloudConfigRef = ctx
            .cloud_config_ref
            .as_deref()
            .ok_or_else(|| FailoverError::Validation("no cloud config present for context".to_string()))
            .and_then(|raw| {
                serde_json::from_str(raw)
                    .map_err(|e| FailoverError::Validation(format!("invalid cloud config: {}", e)))
            })?;

        let strategy = derive_network_strategy(config.network_strategy, &config.network_mappings, config.failover_type);
        let latest_job = vm_context::latest_completed_job(&self.pool, &ctx_id)
            .await
            .map_err(|e| FailoverError::Persistence(e.to_string()))?;

        // Phase 2: create failover job row.
        let vm_spec_snapshot = json!({
            "source_vm_id": ctx.source_vm_id,
            "name": ctx.name,
            "network_strategy": strategy.as_str(),
            "cloud_config": cloud_cfg_json(&cloud_cfg),
        });
        let job = FailoverJob {
            id: format!("failover-{}", Uuid::new_v4()),
            vm_context_id: ctx_id.clone(),
            failover_type: config.failover_type.as_str().to_string(),
            status: "running".to_string(),
            destination_vm_id: None,
            vm_spec_snapshot: Some(vm_spec_snapshot),
            replication_job_id: latest_job.as_ref().map(|j| j.id.clone()),
            network_strategy: strategy.as_str().to_string(),
            virtio_status: None,
            ossea_snapshot_id: None,
            prior_context_status: Some(ctx.status.clone()),
            created_at: Utc::now(),
            completed_at: None,
        };
        fqueries::insert_job(&self.pool, &job)
            .await
            .map_err(|e| FailoverError::Persistence(e.to_string()))?;

        if let Err(e) = self.run_body(config, &ctx, &job, &latest_job).await {
            fqueries::complete_job(&self.pool, &job.id, "failed")
                .await
                .map_err(|pe| FailoverError::Persistence(pe.to_string()))?;
            return Err(e);
        }

        fqueries::complete_job(&self.pool, &job.id, "completed")
            .await
            .map_err(|e| FailoverError::Persistence(e.to_string()))?;
        fqueries::get_job(&self.pool, &job.id)
            .await
            .map_err(|e| FailoverError::Persistence(e.to_string()))
    }

    async fn run_body(
        &self,
        config: &FailoverConfig,
        ctx: &crate::db::tables::VmReplicationContext,
        job: &FailoverJob,
        latest_job: &Option<crate::db::tables::ReplicationJob>,
    ) -> Result<(), FailoverError> {
        // Phase 3: source power-off (live only).
        if config.failover_type.power_off_source() {
            self.sna
                .vm_power_off(&ctx.source_vm_id, false, self.power_off_timeout)
                .await
                .map_err(|e| FailoverError::Sna(e.to_string()))?;
        }

        // Phase 4: final sync (live only).
        if config.failover_type.perform_final_sync() {
            if let Some(prior) = latest_job {
                self.sna
                    .trigger_final_sync(&ctx.source_vm_id, &prior.id)
                    .await
                    .map_err(|e| FailoverError::Sna(e.to_string()))?;
                self.wait_for_sync_completion(&prior.id).await?;
            }
        }

        // Phase 4.5: context status update.
        vm_context::update_status(&self.pool, &ctx.id, config.failover_type.context_status())
            .await
            .map_err(|e| FailoverError::Persistence(e.to_string()))?;

        // Phase 5: multi-volume snapshot create. Always for test, optional for live.
        let want_snapshot = config.failover_type == FailoverType::Test
            || matches!(config.snapshot_type, model::SnapshotType::MultiVolume);
        let mut first_snapshot_id: Option<String> = None;
        if want_snapshot {
            let results = self
                .snapshot
                .create_all_volume_snapshots(&ctx.id)
                .await
                .map_err(|e| FailoverError::Cloud(e.to_string()))?;
            first_snapshot_id = results.into_iter().find_map(|r| r.snapshot_id);
            if let Some(snapshot_id) = &first_snapshot_id {
                fqueries::set_legacy_snapshot(&self.pool, &job.id, snapshot_id)
                    .await
                    .map_err(|e| FailoverError::Persistence(e.to_string()))?;
            }
        }

        // Phase 6: driver injection on root volume.
        let root_disk = self.find_root_disk(latest_job).await?;
        if !config.skip_virtio {
            match self.sna.inject_virtio_drivers(&ctx.source_vm_id).await {
                Ok(()) => {
                    fqueries::update_virtio_status(&self.pool, &job.id, "injected")
                        .await
                        .map_err(|e| FailoverError::Persistence(e.to_string()))?;
                }
                Err(e) => {
                    if config.failover_type == FailoverType::Test {
                        return Err(FailoverError::VirtioInjection(e.to_string()));
                    }
                    warn!("failover: virtio injection failed on live failover, continuing: {}", e);
                    fqueries::update_virtio_status(&self.pool, &job.id, &format!("failed_warning: {}", e))
                        .await
                        .map_err(|pe| FailoverError::Persistence(pe.to_string()))?;
                }
            }
        } else {
            fqueries::update_virtio_status(&self.pool, &job.id, "skipped")
                .await
                .map_err(|e| FailoverError::Persistence(e.to_string()))?;
        }

        // Phase 7: destination VM create.
        let strategy = derive_network_strategy(config.network_strategy, &config.network_mappings, config.failover_type);
        let cloud_cfg: CloudConfigRef = serde_json::from_str(ctx.cloud_config_ref.as_deref().unwrap_or("{}"))
            .map_err(|e| FailoverError::Validation(format!("invalid cloud config: {}", e)))?;
        let network_id = resolve_network_id(&cloud_cfg, strategy, &config.network_mappings);
        let dest_name = destination_vm_name(&ctx.name, config.failover_type, Utc::now().timestamp());
        let spec = CloudVmSpec {
            name: dest_name,
            service_offering_id: cloud_cfg.service_offering_id.clone(),
            template_id: cloud_cfg.template_id.clone(),
            zone_id: cloud_cfg.zone_id.clone(),
            network_id,
        };
        let destination_vm_id = self
            .cloud
            .create_vm(&spec)
            .await
            .map_err(|e| FailoverError::Cloud(e.to_string()))?;
        fqueries::set_destination_vm(&self.pool, &job.id, &destination_vm_id)
            .await
            .map_err(|e| FailoverError::Persistence(e.to_string()))?;

        // Phase 8: delete the destination's template-provisioned root volume
        // before attaching the replicated disks.
        if let Some(default_root) = self
            .cloud
            .default_root_volume(&destination_vm_id)
            .await
            .map_err(|e| FailoverError::Cloud(e.to_string()))?
        {
            self.cloud
                .delete_volume(&default_root)
                .await
                .map_err(|e| FailoverError::Cloud(e.to_string()))?;
        }

        // Volume attachment, root-first then data disks.
        let mut volumes = vqueries::list_volumes_for_context(&self.pool, &ctx.id)
            .await
            .map_err(|e| FailoverError::Persistence(e.to_string()))?;
        let root_volume_id = root_disk.as_ref().and_then(|d| d.volume_id.clone());
        volumes.sort_by_key(|v| if root_volume_id.as_deref() == Some(v.id.as_str()) { 0 } else { 1 });

        for volume in &volumes {
            let is_root = root_volume_id.as_deref() == Some(volume.id.as_str());
            let detach_op_id = self
                .volume_daemon
                .detach(volume.id.clone())
                .await
                .map_err(|e| FailoverError::Cloud(e.to_string()))?;
            self.volume_daemon
                .wait_for_completion(&detach_op_id, self.volume_attach_timeout)
                .await
                .map_err(|e| FailoverError::Timeout(e.to_string()))?;

            self.cloud
                .attach_volume(&volume.id, &destination_vm_id, is_root)
                .await
                .map_err(|e| FailoverError::Cloud(e.to_string()))?;
            let op_id = self
                .volume_daemon
                .attach(volume.id.clone(), destination_vm_id.clone(), is_root)
                .await
                .map_err(|e| FailoverError::Cloud(e.to_string()))?;
            self.volume_daemon
                .wait_for_completion(&op_id, self.volume_attach_timeout)
                .await
                .map_err(|e| FailoverError::Timeout(e.to_string()))?;
        }

        // Phase 4.75 (applied here, after detach/attach so the hub's NBD
        // exports are torn down while their mappings still read mode=="hub"):
        // volume mode switch to failover.
        vqueries::switch_mode_for_context(&self.pool, &ctx.id, "failover")
            .await
            .map_err(|e| FailoverError::Persistence(e.to_string()))?;

        // Phase 9: power-on + light validation.
        self.cloud
            .power_on(&destination_vm_id)
            .await
            .map_err(|e| FailoverError::Cloud(e.to_string()))?;
        let state = self.wait_for_running(&destination_vm_id).await?;
        if state != CloudVmState::Running {
            warn!("failover: destination vm {} did not reach running state in time", destination_vm_id);
        }

        // Phase 10: status finalization.
        let summary = match first_snapshot_id {
            Some(snapshot_id) => json!({"destination_vm_id": destination_vm_id, "legacy_snapshot_id": snapshot_id}),
            None => json!({"destination_vm_id": destination_vm_id}),
        };
        vm_context::record_operation_summary(&self.pool, &ctx.id, summary)
            .await
            .map_err(|e| FailoverError::Persistence(e.to_string()))?;

        info!("failover: job {} completed, destination vm {}", job.id, destination_vm_id);
        Ok(())
    }

    async fn validate(&self, ctx_id: &str, ctx: &crate::db::tables::VmReplicationContext) -> Result<(), FailoverError> {
        if ctx.cloud_config_ref.is_none() {
            return Err(FailoverError::Validation("cloud config not present".to_string()));
        }
        if let Some(active) = fqueries::latest_for_context(&self.pool, ctx_id)
            .await
            .map_err(|e| FailoverError::Persistence(e.to_string()))?
        {
            if active.status == "running" || active.status == "pending" {
                return Err(FailoverError::Validation(format!(
                    "context {} already has an active failover job {}",
                    ctx_id, active.id
                )));
            }
        }
        let volumes = vqueries::list_volumes_for_context(&self.pool, ctx_id)
            .await
            .map_err(|e| FailoverError::Persistence(e.to_string()))?;
        if volumes.is_empty() {
            return Err(FailoverError::Validation(format!("context {} has no volumes to fail over", ctx_id)));
        }
        Ok(())
    }

    async fn find_root_disk(
        &self,
        latest_job: &Option<crate::db::tables::ReplicationJob>,
    ) -> Result<Option<crate::db::tables::Disk>, FailoverError> {
        let Some(job) = latest_job else { return Ok(None) };
        let disks = vm_context::list_disks_for_job(&self.pool, &job.id)
            .await
            .map_err(|e| FailoverError::Persistence(e.to_string()))?;
        Ok(disks.into_iter().find(|d| d.is_root()))
    }

    async fn wait_for_sync_completion(&self, job_id: &str) -> Result<(), FailoverError> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(3600);
        loop {
            let job = vm_context::get_job(&self.pool, job_id)
                .await
                .map_err(|e| FailoverError::Persistence(e.to_string()))?;
            match job.status.as_str() {
                "completed" => return Ok(()),
                "failed" | "cancelled" => {
                    return Err(FailoverError::Sna(format!("final sync job {} ended in {}", job_id, job.status)))
                }
                _ => {}
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(FailoverError::Timeout(format!("final sync job {}", job_id)));
            }
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    }

    async fn wait_for_running(&self, vm_id: &str) -> Result<CloudVmState, FailoverError> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(300);
        loop {
            let state = self.cloud.vm_state(vm_id).await.map_err(|e| FailoverError::Cloud(e.to_string()))?;
            if state == CloudVmState::Running || tokio::time::Instant::now() >= deadline {
                return Ok(state);
            }
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    }

    /// Rollback path for a test-failover cleanup (spec §4.6): stop the
    /// destination, detach and delete it, revert and delete every tracked
    /// snapshot, restore volumes to hub mode, reattach to hub, and restore
    /// the context's prior status.
    pub async fn rollback_test_failover(&self, failover_job_id: &str) -> Result<(), FailoverError> {
        let job = fqueries::get_job(&self.pool, failover_job_id)
            .await
            .map_err(|e| FailoverError::Persistence(e.to_string()))?;
        let Some(destination_vm_id) = job.destination_vm_id.clone() else {
            return Err(FailoverError::Validation(format!("failover job {} has no destination vm", failover_job_id)));
        };

        if self.cloud.vm_state(&destination_vm_id).await.map_err(|e| FailoverError::Cloud(e.to_string()))? == CloudVmState::Running {
            self.cloud
                .power_off(&destination_vm_id, true)
                .await
                .map_err(|e| FailoverError::Cloud(e.to_string()))?;
        }

        let volumes = vqueries::list_volumes_for_context(&self.pool, &job.vm_context_id)
            .await
            .map_err(|e| FailoverError::Persistence(e.to_string()))?;
        for volume in &volumes {
            self.volume_daemon
                .detach(volume.id.clone())
                .await
                .map_err(|e| FailoverError::Cloud(e.to_string()))?;
        }

        self.cloud
            .delete_vm(&destination_vm_id)
            .await
            .map_err(|e| FailoverError::Cloud(e.to_string()))?;

        self.snapshot
            .cleanup_all_volume_snapshots(&job.vm_context_id)
            .await
            .map_err(|e| FailoverError::Cloud(e.to_string()))?;

        vqueries::switch_mode_for_context(&self.pool, &job.vm_context_id, "hub")
            .await
            .map_err(|e| FailoverError::Persistence(e.to_string()))?;

        let hub_vm_id = self.volume_daemon.hub_vm_id().to_string();
        for volume in &volumes {
            let op_id = self
                .volume_daemon
                .attach(volume.id.clone(), hub_vm_id.clone(), false)
                .await
                .map_err(|e| FailoverError::Cloud(e.to_string()))?;
            self.volume_daemon
                .wait_for_completion(&op_id, self.volume_attach_timeout)
                .await
                .map_err(|e| FailoverError::Timeout(e.to_string()))?;
        }

        let restore_status = job.prior_context_status.clone().unwrap_or_else(|| "ready_for_failover".to_string());
        vm_context::update_status(&self.pool, &job.vm_context_id, &restore_status)
            .await
            .map_err(|e| FailoverError::Persistence(e.to_string()))?;

        fqueries::complete_job(&self.pool, failover_job_id, "rolled_back")
            .await
            .map_err(|e| FailoverError::Persistence(e.to_string()))?;
        Ok(())
    }
}

fn cloud_cfg_json(cfg: &CloudConfigRef) -> serde_json::Value {
    json!({
        "service_offering_id": cfg.service_offering_id,
        "template_id": cfg.template_id,
        "zone_id": cfg.zone_id,
    })
}

fn resolve_network_id(cfg: &CloudConfigRef, strategy: model::NetworkStrategy, mappings: &[model::NetworkMapping]) -> String {
    if let Some(m) = mappings.first() {
        return m.destination_network_id.clone();
    }
    match strategy {
        model::NetworkStrategy::Isolated => cfg.isolated_network_id.clone().unwrap_or_else(|| "isolated-default".to_string()),
        _ => cfg.production_network_id.clone().unwrap_or_else(|| "production-default".to_string()),
    }
}
