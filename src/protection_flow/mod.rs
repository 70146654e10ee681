pub mod error;
pub mod model;

use crate::backup::{BackupEngine, DataMover, SourceDisk};
use crate::db::queries::{backup as bqueries, flow as fqueries, vm_context};
use crate::db::tables::{FlowExecution, ProtectionFlow};
use crate::network::sna_client::SnaClient;
use chrono::Utc;
use error::FlowError;
use futures::future::join_all;
use log::{error, info, warn};
use serde_json::json;
use sqlx::{MySql, Pool};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

struct TargetOutcome {
    job_id: Option<String>,
    succeeded: bool,
    skipped: bool,
    bytes_transferred: i64,
}

/// Scheduled and manual trigger entry point for protection flows (spec
/// §4.9). Dispatches per-VM work to the Backup Engine (C7) for backup
/// flows; drives the SNA directly for replication flows, since no separate
/// replication execution engine is part of this kernel's scope.
pub struct ProtectionFlowEngine {
    pool: Pool<MySql>,
    backup_engine: Arc<BackupEngine>,
    mover: Arc<dyn DataMover>,
    sna: Arc<SnaClient>,
}

impl ProtectionFlowEngine {
    pub fn new(pool: Pool<MySql>, backup_engine: Arc<BackupEngine>, mover: Arc<dyn DataMover>, sna: Arc<SnaClient>) -> Self {
        Self { pool, backup_engine, mover, sna }
    }

    /// Ticker entry point: pulls every flow due to fire and runs each as a
    /// `scheduled` execution, rescheduling it for its next fire time
    /// regardless of outcome.
    pub async fn run_due_flows(&self) -> Result<usize, FlowError> {
        let due = fqueries::list_due(&self.pool, Utc::now())
            .await
            .map_err(|e| FlowError::Persistence(e.to_string()))?;
        let count = due.len();
        for flow in due {
            if let Some(cron_expr) = &flow.schedule_cron {
                match model::next_execution_time(cron_expr, Utc::now()) {
                    Ok(next) => {
                        if let Err(e) = fqueries::reschedule(&self.pool, &flow.id, next).await {
                            error!("protection flow: failed to reschedule {}: {}", flow.id, e);
                        }
                    }
                    Err(e) => warn!("protection flow: bad schedule on {}: {}", flow.id, e),
                }
            }
            if let Err(e) = self.run_execution(&flow, "scheduled", None).await {
                error!("protection flow: scheduled run of {} failed: {}", flow.id, e);
            }
        }
        Ok(count)
    }

    pub async fn trigger(&self, flow_id: &str, user: &str) -> Result<FlowExecution, FlowError> {
        let flow = fqueries::get_flow(&self.pool, flow_id)
            .await
            .map_err(|_| FlowError::NotFound(flow_id.to_string()))?;
        self.run_execution(&flow, "manual", Some(user)).await
    }

    async fn run_execution(
        &self,
        flow: &ProtectionFlow,
        execution_type: &str,
        triggered_by: Option<&str>,
    ) -> Result<FlowExecution, FlowError> {
        let started_at = Utc::now();
        let execution = FlowExecution {
            id: format!("flowexec-{}", Uuid::new_v4()),
            flow_id: flow.id.clone(),
            status: "running".to_string(),
            execution_type: execution_type.to_string(),
            triggered_by: triggered_by.map(str::to_string),
            created_job_ids: json!([]),
            jobs_created: 0,
            jobs_completed: 0,
            jobs_failed: 0,
            jobs_skipped: 0,
            bytes_transferred: 0,
            started_at,
            completed_at: None,
            duration_ms: None,
        };
        fqueries::insert_execution(&self.pool, &execution)
            .await
            .map_err(|e| FlowError::Persistence(e.to_string()))?;

        let targets = self.expand_targets(flow).await?;
        if targets.is_empty() {
            fqueries::complete_execution(&self.pool, &execution.id, "warning", 0, 0, 0, 0, 0)
                .await
                .map_err(|e| FlowError::Persistence(e.to_string()))?;
            return Err(FlowError::NoTargets(flow.id.clone()));
        }

        let outcomes: Vec<TargetOutcome> = join_all(
            targets
                .iter()
                .map(|ctx_id| self.run_one_target(flow, &execution.id, ctx_id)),
        )
        .await;

        let mut completed = 0i64;
        let mut failed = 0i64;
        let mut skipped = 0i64;
        let mut bytes_transferred = 0i64;
        for outcome in &outcomes {
            if let Some(job_id) = &outcome.job_id {
                if let Err(e) = fqueries::append_created_job(&self.pool, &execution.id, job_id).await {
                    error!("protection flow: failed to record job id {} on execution {}: {}", job_id, execution.id, e);
                }
            }
            if outcome.skipped {
                skipped += 1;
            } else if outcome.succeeded {
                completed += 1;
            } else {
                failed += 1;
            }
            bytes_transferred += outcome.bytes_transferred;
        }

        let status = model::rollup_status(completed, failed, skipped, false);
        let duration_ms = (Utc::now() - started_at).num_milliseconds();
        fqueries::complete_execution(
            &self.pool,
            &execution.id,
            status,
            completed,
            failed,
            skipped,
            bytes_transferred,
            duration_ms,
        )
        .await
        .map_err(|e| FlowError::Persistence(e.to_string()))?;

        info!(
            "protection flow: execution {} for flow {} finished {} (completed={}, failed={}, skipped={})",
            execution.id, flow.id, status, completed, failed, skipped
        );

        Ok(execution)
    }

    async fn expand_targets(&self, flow: &ProtectionFlow) -> Result<Vec<String>, FlowError> {
        match flow.target_type.as_str() {
            "vm" => Ok(vec![flow.target_id.clone()]),
            "group" => Ok(flow.target_id.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()),
            other => Err(FlowError::InvalidSchedule(format!("unknown target type {}", other))),
        }
    }

    async fn run_one_target(&self, flow: &ProtectionFlow, execution_id: &str, vm_context_id: &str) -> TargetOutcome {
        let ctx = match vm_context::get_context(&self.pool, vm_context_id).await {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!("protection flow: execution {} skipping missing context {}: {}", execution_id, vm_context_id, e);
                return TargetOutcome { job_id: None, succeeded: false, skipped: true, bytes_transferred: 0 };
            }
        };

        match flow.flow_type.as_str() {
            "backup" => self.run_backup_target(flow, &ctx).await,
            "replication" => self.run_replication_target(&ctx).await,
            _ => TargetOutcome { job_id: None, succeeded: false, skipped: true, bytes_transferred: 0 },
        }
    }

    async fn run_backup_target(&self, flow: &ProtectionFlow, ctx: &crate::db::tables::VmReplicationContext) -> TargetOutcome {
        let Some(repository_id) = &flow.repository_id else {
            return TargetOutcome { job_id: None, succeeded: false, skipped: true, bytes_transferred: 0 };
        };
        let Ok(Some(latest_job)) = vm_context::latest_completed_job(&self.pool, &ctx.id).await else {
            warn!("protection flow: no completed replication job for context {}, skipping backup", ctx.id);
            return TargetOutcome { job_id: None, succeeded: false, skipped: true, bytes_transferred: 0 };
        };
        let disks = match vm_context::list_disks_for_job(&self.pool, &latest_job.id).await {
            Ok(disks) => disks,
            Err(e) => {
                error!("protection flow: failed to list disks for {}: {}", latest_job.id, e);
                return TargetOutcome { job_id: None, succeeded: false, skipped: false, bytes_transferred: 0 };
            }
        };
        let bctx_id = format!("bctx-{}", Uuid::new_v4());
        let bctx = match bqueries::get_or_create_backup_context(&self.pool, &ctx.vm_id, repository_id, &bctx_id).await {
            Ok(bctx) => bctx,
            Err(e) => {
                error!("protection flow: failed to resolve backup context for {}: {}", ctx.vm_id, e);
                return TargetOutcome { job_id: None, succeeded: false, skipped: false, bytes_transferred: 0 };
            }
        };
        let chain_exists = bqueries::get_chain(&self.pool, &bctx.id, 0).await.ok().flatten().is_some();
        let requested_type = model::decide_backup_type(chain_exists, false);

        let source_disks = disks
            .into_iter()
            .map(|d| SourceDisk { index: d.unit_number, size_bytes: d.size_bytes, change_id: d.change_id })
            .collect();

        match self
            .backup_engine
            .create_backup(&ctx.vm_id, &ctx.name, repository_id, requested_type, source_disks, self.mover.clone())
            .await
        {
            Ok(job) => TargetOutcome {
                job_id: Some(job.id.clone()),
                succeeded: job.status == "completed",
                skipped: false,
                bytes_transferred: job.bytes_transferred,
            },
            Err(e) => {
                error!("protection flow: backup for {} failed: {}", ctx.vm_id, e);
                TargetOutcome { job_id: None, succeeded: false, skipped: false, bytes_transferred: 0 }
            }
        }
    }

    async fn run_replication_target(&self, ctx: &crate::db::tables::VmReplicationContext) -> TargetOutcome {
        let job = crate::db::tables::ReplicationJob {
            id: format!("job-{}", Uuid::new_v4()),
            vm_context_id: ctx.id.clone(),
            status: "running".to_string(),
            bytes_transferred: 0,
            bytes_total: 0,
            current_operation: Some("sync".to_string()),
            next_change_id: None,
            parent_job_id: ctx.last_successful_job_id.clone(),
            schedule_execution_id: None,
            group_id: None,
            started_at: Some(Utc::now()),
            completed_at: None,
            created_at: Utc::now(),
        };
        if let Err(e) = vm_context::insert_job(&self.pool, &job).await {
            error!("protection flow: failed to create replication job for {}: {}", ctx.id, e);
            return TargetOutcome { job_id: None, succeeded: false, skipped: false, bytes_transferred: 0 };
        }

        if let Err(e) = self.sna.trigger_final_sync(&ctx.source_vm_id, &job.id).await {
            error!("protection flow: failed to trigger sync for {}: {}", ctx.id, e);
            let _ = vm_context::complete_job(&self.pool, &job.id, "failed", None).await;
            let _ = vm_context::record_job_outcome(&self.pool, &ctx.id, &job.id, false).await;
            return TargetOutcome { job_id: Some(job.id), succeeded: false, skipped: false, bytes_transferred: 0 };
        }

        let deadline = tokio::time::Instant::now() + Duration::from_secs(3600);
        loop {
            match vm_context::get_job(&self.pool, &job.id).await {
                Ok(current) if current.status == "completed" => {
                    let _ = vm_context::record_job_outcome(&self.pool, &ctx.id, &job.id, true).await;
                    return TargetOutcome {
                        job_id: Some(job.id),
                        succeeded: true,
                        skipped: false,
                        bytes_transferred: current.bytes_transferred,
                    };
                }
                Ok(current) if current.status == "failed" || current.status == "cancelled" => {
                    let _ = vm_context::record_job_outcome(&self.pool, &ctx.id, &job.id, false).await;
                    return TargetOutcome { job_id: Some(job.id), succeeded: false, skipped: false, bytes_transferred: 0 };
                }
                _ => {}
            }
            if tokio::time::Instant::now() >= deadline {
                warn!("protection flow: replication job {} timed out", job.id);
                let _ = vm_context::complete_job(&self.pool, &job.id, "failed", None).await;
                let _ = vm_context::record_job_outcome(&self.pool, &ctx.id, &job.id, false).await;
                return TargetOutcome { job_id: Some(job.id), succeeded: false, skipped: false, bytes_transferred: 0 };
            }
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    }

    pub async fn run_ticker_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(30));
        loop {
            ticker.tick().await;
            match self.run_due_flows().await {
                Ok(0) => {}
                Ok(n) => info!("protection flow: ran {} due flow(s)", n),
                Err(e) => error!("protection flow: tick failed: {}", e),
            }
        }
    }
}
