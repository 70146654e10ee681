pub mod error;
pub mod model;

use crate::db::queries::backup as queries;
use crate::db::tables::{BackupDisk, BackupJob};
use async_trait::async_trait;
use chrono::Utc;
use error::BackupError;
use futures::future::join_all;
use log::{error, info, warn};
use sqlx::{MySql, Pool};
use std::sync::Arc;
use tokio::sync::Semaphore;
use uuid::Uuid;

/// One VM disk as the replication/inventory layer describes it to the
/// Backup Engine.
#[derive(Debug, Clone)]
pub struct SourceDisk {
    pub index: i32,
    pub size_bytes: i64,
    /// The source hypervisor's current change-tracking id for this disk,
    /// used to decide full vs incremental (spec §4.7).
    pub change_id: Option<String>,
}

/// Abstraction over whatever actually copies bytes from the source into the
/// repository — a hypervisor-specific data mover reached through the SNA
/// tunnel in production, a fake in tests.
#[async_trait]
pub trait DataMover: Send + Sync {
    async fn write_image(
        &self,
        source_disk_index: i32,
        parent_image_path: Option<&str>,
        destination_path: &str,
    ) -> Result<DiskWriteResult, BackupError>;
}

pub struct DiskWriteResult {
    pub bytes_written: i64,
    pub new_change_id: String,
}

pub struct BackupEngine {
    pool: Pool<MySql>,
    repository_root: String,
    /// Per-repository concurrency limit on disk workers (spec §5, default 4).
    concurrency: Arc<Semaphore>,
}

impl BackupEngine {
    pub fn new(pool: Pool<MySql>, repository_root: String, per_repository_concurrency: usize) -> Self {
        Self {
            pool,
            repository_root,
            concurrency: Arc::new(Semaphore::new(per_repository_concurrency.max(1))),
        }
    }

    /// Runs steps 1-5 of spec §4.7 for one VM: ensures the backup context,
    /// creates the parent job and its disk children, fans disk workers out
    /// up to the per-repository concurrency limit, and finalizes the parent
    /// once every disk has reported.
    pub async fn create_backup(
        &self,
        vm_id: &str,
        vm_name: &str,
        repository_id: &str,
        requested_type: &str,
        disks: Vec<SourceDisk>,
        mover: Arc<dyn DataMover>,
    ) -> Result<BackupJob, BackupError> {
        let context_id = format!("bctx-{}", Uuid::new_v4());
        let context = queries::get_or_create_backup_context(&self.pool, vm_id, repository_id, &context_id)
            .await
            .map_err(|e| BackupError::Persistence(e.to_string()))?;

        let job = BackupJob {
            id: format!("bjob-{}", Uuid::new_v4()),
            vm_backup_context_id: context.id.clone(),
            backup_type: requested_type.to_string(),
            status: "running".to_string(),
            parent_job_id: None,
            started_at: Some(Utc::now()),
            completed_at: None,
            created_at: Utc::now(),
            bytes_transferred: 0,
            bytes_total: disks.iter().map(|d| d.size_bytes).sum(),
            error_message: None,
            metadata: None,
        };
        queries::insert_job(&self.pool, &job)
            .await
            .map_err(|e| BackupError::Persistence(e.to_string()))?;

        let mut handles = Vec::with_capacity(disks.len());
        for disk in disks {
            let permit = self.concurrency.clone();
            let pool = self.pool.clone();
            let repository_root = self.repository_root.clone();
            let job_id = job.id.clone();
            let context_id = context.id.clone();
            let vm_name = vm_name.to_string();
            let requested_type = requested_type.to_string();
            let mover = mover.clone();

            handles.push(tokio::spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore closed");
                run_disk(
                    &pool,
                    &repository_root,
                    &job_id,
                    &context_id,
                    &vm_name,
                    &requested_type,
                    disk,
                    mover,
                )
                .await
            }));
        }

        let results = join_all(handles).await;
        let mut completed = 0i64;
        let mut failed = 0i64;
        for result in results {
            match result {
                Ok(Ok(())) => completed += 1,
                Ok(Err(e)) => {
                    failed += 1;
                    error!("backup engine: disk worker failed for job {}: {}", job.id, e);
                }
                Err(e) => {
                    failed += 1;
                    error!("backup engine: disk worker panicked for job {}: {}", job.id, e);
                }
            }
        }

        if failed == 0 {
            queries::complete_job(&self.pool, &job.id, "completed", None)
                .await
                .map_err(|e| BackupError::Persistence(e.to_string()))?;
            info!("backup engine: job {} completed ({} disks)", job.id, completed);
        } else {
            let msg = format!("{} of {} disks failed", failed, completed + failed);
            queries::complete_job(&self.pool, &job.id, "failed", Some(&msg))
                .await
                .map_err(|e| BackupError::Persistence(e.to_string()))?;
            warn!("backup engine: job {} failed: {}", job.id, msg);
        }

        queries::get_job(&self.pool, &job.id)
            .await
            .map_err(|e| BackupError::Persistence(e.to_string()))
    }
}

async fn run_disk(
    pool: &Pool<MySql>,
    repository_root: &str,
    job_id: &str,
    context_id: &str,
    vm_name: &str,
    requested_type: &str,
    source: SourceDisk,
    mover: Arc<dyn DataMover>,
) -> Result<(), BackupError> {
    let latest = queries::latest_disk_for_chain(pool, context_id, source.index)
        .await
        .map_err(|e| BackupError::Persistence(e.to_string()))?;

    let plan = model::plan_disk(requested_type, latest.as_ref(), source.change_id.as_deref());
    if let Some(reason) = &plan.promotion_reason {
        warn!(
            "backup engine: disk {} on job {} promoted to full ({})",
            source.index, job_id, reason
        );
        if let Err(e) = queries::record_promotion_reason(pool, job_id, source.index, reason).await {
            error!("backup engine: failed to record promotion reason for job {}: {}", job_id, e);
        }
    }

    let disk_id = format!("bdisk-{}", Uuid::new_v4());
    let dest_path = model::image_path(repository_root, vm_name, job_id, source.index, plan.backup_type);

    let mut disk = BackupDisk {
        id: disk_id.clone(),
        backup_job_id: job_id.to_string(),
        disk_index: source.index,
        disk_change_id: None,
        prior_change_id: plan.prior_change_id.clone(),
        image_path: dest_path.clone(),
        size_bytes: source.size_bytes,
        status: "running".to_string(),
        bytes_transferred: 0,
        completed_at: None,
    };
    queries::insert_disk(pool, &disk)
        .await
        .map_err(|e| BackupError::Persistence(e.to_string()))?;

    let write_result = mover
        .write_image(source.index, plan.parent_image_path.as_deref(), &dest_path)
        .await;

    let outcome = match write_result {
        Ok(result) => {
            disk.disk_change_id = Some(result.new_change_id);
            queries::complete_disk(pool, &disk_id, "completed", result.bytes_written)
                .await
                .map_err(|e| BackupError::Persistence(e.to_string()))?;
            queries::upsert_chain(pool, context_id, source.index, &disk_id, result.bytes_written)
                .await
                .map_err(|e| BackupError::Persistence(e.to_string()))?;
            Ok(())
        }
        Err(e) => {
            queries::complete_disk(pool, &disk_id, "failed", 0)
                .await
                .map_err(|persist_err| BackupError::Persistence(persist_err.to_string()))?;
            Err(e)
        }
    };

    // Parent job progress = sum(per-disk bytes_transferred) (spec §4.7).
    match queries::sum_disk_bytes_transferred(pool, job_id).await {
        Ok(sum) => {
            if let Err(e) = queries::update_job_progress(pool, job_id, sum).await {
                error!("backup engine: failed to update job progress for {}: {}", job_id, e);
            }
        }
        Err(e) => error!("backup engine: failed to sum disk bytes for job {}: {}", job_id, e),
    }

    outcome
}
