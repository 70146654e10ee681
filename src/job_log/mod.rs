pub mod error;

use crate::db::queries::job_log as queries;
use crate::db::tables::{JobLogJob, JobLogStep};
use chrono::Utc;
use error::JobLogError;
use log::{error, info};
use sqlx::{MySql, Pool};
use uuid::Uuid;

/// Handle returned by `start_job`, carried through the lifetime of one
/// operation so every step and the final completion call can be attributed
/// to the same job id without threading the id through every signature.
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub job_id: String,
}

impl JobHandle {
    /// spec §4.1 `JobIDFromCtx(ctx)`: the job id a handle carries.
    pub fn job_id(&self) -> &str {
        &self.job_id
    }
}

/// A logger scoped to one job, prefixing every line with its id so
/// ordinary `log` output can be correlated with a Job Log entry without
/// threading the id through every call site (spec §4.1 `Logger(ctx)`,
/// SPEC_FULL §A.2).
pub struct JobLogger<'a> {
    job_id: &'a str,
}

impl<'a> JobLogger<'a> {
    pub fn info(&self, msg: &str) {
        info!("[job {}] {}", self.job_id, msg);
    }

    pub fn warn(&self, msg: &str) {
        log::warn!("[job {}] {}", self.job_id, msg);
    }

    pub fn error(&self, msg: &str) {
        error!("[job {}] {}", self.job_id, msg);
    }

    pub fn debug(&self, msg: &str) {
        log::debug!("[job {}] {}", self.job_id, msg);
    }
}

/// Serialized access to one job's bookkeeping: any number of callers may hold
/// a `JobHandle` for the same job id, but Job Log itself guarantees steps and
/// completion for a given id never race (spec §5, "internally serialized per
/// job id").
pub struct JobLog {
    pool: Pool<MySql>,
}

impl JobLog {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }

    pub async fn start_job(
        &self,
        job_type: &str,
        operation: &str,
        owner: &str,
        context_id: Option<&str>,
        external_id: Option<&str>,
        category: &str,
    ) -> Result<JobHandle, JobLogError> {
        let job = JobLogJob {
            id: format!("joblog-{}", Uuid::new_v4()),
            job_type: job_type.to_string(),
            operation: operation.to_string(),
            owner: owner.to_string(),
            context_id: context_id.map(str::to_string),
            external_id: external_id.map(str::to_string),
            category: category.to_string(),
            status: "running".to_string(),
            total_steps: 0,
            completed_steps: 0,
            started_at: Utc::now(),
            ended_at: None,
            error: None,
        };
        queries::start_job(&self.pool, &job)
            .await
            .map_err(|e| JobLogError::Persistence(e.to_string()))?;
        info!("job log: started job {} ({} / {})", job.id, job_type, operation);
        Ok(JobHandle { job_id: job.id })
    }

    /// Runs `step_name` as one Job Log step, recording its outcome whether
    /// `f` succeeds or fails. The step error (if any) is logged in full here;
    /// callers further up the stack only ever see a sanitized summary.
    pub async fn run_step<F, Fut, T, E>(
        &self,
        handle: &JobHandle,
        step_name: &str,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let step_id = format!("jlstep-{}", Uuid::new_v4());
        let step = JobLogStep {
            id: step_id.clone(),
            job_id: handle.job_id.clone(),
            step_name: step_name.to_string(),
            status: "running".to_string(),
            started_at: Utc::now(),
            ended_at: None,
            error: None,
        };
        if let Err(e) = queries::start_step(&self.pool, &step).await {
            error!("job log: failed to record step start for {}: {}", handle.job_id, e);
        }

        let result = f().await;

        let (status, err_text) = match &result {
            Ok(_) => ("completed", None),
            Err(e) => ("failed", Some(e.to_string())),
        };
        if let Err(e) = queries::complete_step(
            &self.pool,
            &step_id,
            &handle.job_id,
            status,
            err_text.as_deref(),
        )
        .await
        {
            error!("job log: failed to record step completion for {}: {}", handle.job_id, e);
        }
        result
    }

    pub async fn end_job(&self, handle: &JobHandle, status: &str, error_msg: Option<&str>) {
        if let Err(e) = queries::complete_job(&self.pool, &handle.job_id, status, error_msg).await
        {
            error!("job log: failed to complete job {}: {}", handle.job_id, e);
        }
        info!("job log: ended job {} with status {}", handle.job_id, status);
    }

    pub async fn find_job(&self, job_id: &str) -> Result<JobLogJob, JobLogError> {
        queries::get_job(&self.pool, job_id)
            .await
            .map_err(|e| JobLogError::NotFound(e.to_string()))
    }

    /// spec §4.1 `FindJobByAnyID(id)`: resolves a job by its internal id or
    /// by the external id it may be known by outside this process.
    pub async fn find_job_by_any_id(&self, id: &str) -> Result<JobLogJob, JobLogError> {
        queries::get_job_by_any_id(&self.pool, id)
            .await
            .map_err(|e| JobLogError::NotFound(e.to_string()))
    }

    /// spec §4.1 `Logger(ctx)`: a logger scoped to `handle`'s job id.
    pub fn logger<'a>(&self, handle: &'a JobHandle) -> JobLogger<'a> {
        JobLogger {
            job_id: &handle.job_id,
        }
    }

    pub async fn steps_for_job(&self, job_id: &str) -> Result<Vec<JobLogStep>, JobLogError> {
        queries::list_steps_for_job(&self.pool, job_id)
            .await
            .map_err(|e| JobLogError::Persistence(e.to_string()))
    }

    pub async fn list_for_context(&self, context_id: &str) -> Result<Vec<JobLogJob>, JobLogError> {
        queries::list_for_context(&self.pool, context_id)
            .await
            .map_err(|e| JobLogError::Persistence(e.to_string()))
    }

    /// Retention sweep: deletes jobs (and their steps) that ended before
    /// `retention_days` ago. Run on a periodic tick from the process root.
    pub async fn prune_older_than(&self, retention_days: i64) -> Result<usize, JobLogError> {
        let cutoff = Utc::now() - chrono::Duration::days(retention_days);
        let prunable = queries::list_prunable(&self.pool, cutoff)
            .await
            .map_err(|e| JobLogError::Persistence(e.to_string()))?;
        let count = prunable.len();
        for job in prunable {
            if let Err(e) = queries::prune_job(&self.pool, &job.id).await {
                error!("job log: failed to prune job {}: {}", job.id, e);
            }
        }
        Ok(count)
    }
}
