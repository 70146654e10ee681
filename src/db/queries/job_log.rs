use crate::db::tables::{JobLogJob, JobLogStep};
use anyhow::Context;
use sqlx::{MySql, Pool};

pub async fn start_job(pool: &Pool<MySql>, job: &JobLogJob) -> anyhow::Result<()> {
    sqlx::query(
        r#"INSERT INTO job_log_jobs (
            id, job_type, operation, owner, context_id, external_id, category,
            status, total_steps, completed_steps, started_at, ended_at, error
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&job.id)
    .bind(&job.job_type)
    .bind(&job.operation)
    .bind(&job.owner)
    .bind(&job.context_id)
    .bind(&job.external_id)
    .bind(&job.category)
    .bind(&job.status)
    .bind(job.total_steps)
    .bind(job.completed_steps)
    .bind(job.started_at)
    .bind(job.ended_at)
    .bind(&job.error)
    .execute(pool)
    .await
    .context("Failed to start job log job")?;
    Ok(())
}

pub async fn get_job(pool: &Pool<MySql>, id: &str) -> anyhow::Result<JobLogJob> {
    sqlx::query_as::<_, JobLogJob>("SELECT * FROM job_log_jobs WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .context("Failed to fetch job log job")
}

/// Resolves a job by its internal id or the external id a caller outside
/// this process (the SNA, a cloud API job id) might know it by instead
/// (spec §4.1 `FindJobByAnyID`).
pub async fn get_job_by_any_id(pool: &Pool<MySql>, id: &str) -> anyhow::Result<JobLogJob> {
    sqlx::query_as::<_, JobLogJob>(
        "SELECT * FROM job_log_jobs WHERE id = ? OR external_id = ? ORDER BY started_at DESC LIMIT 1",
    )
    .bind(id)
    .bind(id)
    .fetch_one(pool)
    .await
    .context("Failed to fetch job log job by internal or external id")
}

pub async fn list_for_context(
    pool: &Pool<MySql>,
    context_id: &str,
) -> anyhow::Result<Vec<JobLogJob>> {
    sqlx::query_as::<_, JobLogJob>(
        "SELECT * FROM job_log_jobs WHERE context_id = ? ORDER BY started_at DESC",
    )
    .bind(context_id)
    .fetch_all(pool)
    .await
    .context("Failed to list job log jobs for context")
}

pub async fn complete_job(
    pool: &Pool<MySql>,
    id: &str,
    status: &str,
    error: Option<&str>,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE job_log_jobs SET status = ?, ended_at = NOW(), error = ? WHERE id = ?")
        .bind(status)
        .bind(error)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to complete job log job")?;
    Ok(())
}

pub async fn start_step(pool: &Pool<MySql>, step: &JobLogStep) -> anyhow::Result<()> {
    sqlx::query(
        r#"INSERT INTO job_log_steps (
            id, job_id, step_name, status, started_at, ended_at, error
        ) VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&step.id)
    .bind(&step.job_id)
    .bind(&step.step_name)
    .bind(&step.status)
    .bind(step.started_at)
    .bind(step.ended_at)
    .bind(&step.error)
    .execute(pool)
    .await
    .context("Failed to start job log step")?;

    sqlx::query("UPDATE job_log_jobs SET total_steps = total_steps + 1 WHERE id = ?")
        .bind(&step.job_id)
        .execute(pool)
        .await
        .context("Failed to bump job log total steps")?;
    Ok(())
}

pub async fn complete_step(
    pool: &Pool<MySql>,
    id: &str,
    job_id: &str,
    status: &str,
    error: Option<&str>,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE job_log_steps SET status = ?, ended_at = NOW(), error = ? WHERE id = ?")
        .bind(status)
        .bind(error)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to complete job log step")?;

    if status == "completed" {
        sqlx::query("UPDATE job_log_jobs SET completed_steps = completed_steps + 1 WHERE id = ?")
            .bind(job_id)
            .execute(pool)
            .await
            .context("Failed to bump job log completed steps")?;
    }
    Ok(())
}

pub async fn list_steps_for_job(pool: &Pool<MySql>, job_id: &str) -> anyhow::Result<Vec<JobLogStep>> {
    sqlx::query_as::<_, JobLogStep>(
        "SELECT * FROM job_log_steps WHERE job_id = ? ORDER BY started_at ASC",
    )
    .bind(job_id)
    .fetch_all(pool)
    .await
    .context("Failed to list job log steps")
}

/// Jobs that ended before the retention cutoff — the ambient housekeeping
/// sweep's worklist (SPEC_FULL §B).
pub async fn list_prunable(
    pool: &Pool<MySql>,
    cutoff: chrono::DateTime<chrono::Utc>,
) -> anyhow::Result<Vec<JobLogJob>> {
    sqlx::query_as::<_, JobLogJob>(
        "SELECT * FROM job_log_jobs WHERE ended_at IS NOT NULL AND ended_at <= ?",
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await
    .context("Failed to list prunable job log jobs")
}

pub async fn prune_job(pool: &Pool<MySql>, id: &str) -> anyhow::Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin prune transaction")?;
    sqlx::query("DELETE FROM job_log_steps WHERE job_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to prune job log steps")?;
    sqlx::query("DELETE FROM job_log_jobs WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to prune job log job")?;
    tx.commit().await.context("Failed to commit prune transaction")?;
    Ok(())
}
