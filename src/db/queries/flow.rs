use crate::db::tables::{FlowExecution, ProtectionFlow};
use anyhow::Context;
use sqlx::{MySql, Pool};

pub async fn insert_flow(pool: &Pool<MySql>, flow: &ProtectionFlow) -> anyhow::Result<()> {
    sqlx::query(
        r#"INSERT INTO protection_flows (
            id, name, flow_type, target_type, target_id, enabled, repository_id,
            destination_id, schedule_cron, policy_id, next_execution_at, total_executions,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&flow.id)
    .bind(&flow.name)
    .bind(&flow.flow_type)
    .bind(&flow.target_type)
    .bind(&flow.target_id)
    .bind(flow.enabled)
    .bind(&flow.repository_id)
    .bind(&flow.destination_id)
    .bind(&flow.schedule_cron)
    .bind(&flow.policy_id)
    .bind(flow.next_execution_at)
    .bind(flow.total_executions)
    .bind(flow.created_at)
    .bind(flow.updated_at)
    .execute(pool)
    .await
    .context("Failed to insert protection flow")?;
    Ok(())
}

pub async fn get_flow(pool: &Pool<MySql>, id: &str) -> anyhow::Result<ProtectionFlow> {
    sqlx::query_as::<_, ProtectionFlow>("SELECT * FROM protection_flows WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .context("Failed to fetch protection flow")
}

/// Enabled, scheduled flows due to fire — the ticker's worklist (spec §4.9).
pub async fn list_due(
    pool: &Pool<MySql>,
    now: chrono::DateTime<chrono::Utc>,
) -> anyhow::Result<Vec<ProtectionFlow>> {
    sqlx::query_as::<_, ProtectionFlow>(
        r#"SELECT * FROM protection_flows
           WHERE enabled = TRUE AND schedule_cron IS NOT NULL AND next_execution_at <= ?"#,
    )
    .bind(now)
    .fetch_all(pool)
    .await
    .context("Failed to list due protection flows")
}

pub async fn reschedule(
    pool: &Pool<MySql>,
    id: &str,
    next_execution_at: chrono::DateTime<chrono::Utc>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"UPDATE protection_flows
           SET next_execution_at = ?, total_executions = total_executions + 1, updated_at = NOW()
           WHERE id = ?"#,
    )
    .bind(next_execution_at)
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to reschedule protection flow")?;
    Ok(())
}

pub async fn insert_execution(pool: &Pool<MySql>, exec: &FlowExecution) -> anyhow::Result<()> {
    sqlx::query(
        r#"INSERT INTO flow_executions (
            id, flow_id, status, execution_type, triggered_by, created_job_ids,
            jobs_created, jobs_completed, jobs_failed, jobs_skipped, bytes_transferred,
            started_at, completed_at, duration_ms
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&exec.id)
    .bind(&exec.flow_id)
    .bind(&exec.status)
    .bind(&exec.execution_type)
    .bind(&exec.triggered_by)
    .bind(&exec.created_job_ids)
    .bind(exec.jobs_created)
    .bind(exec.jobs_completed)
    .bind(exec.jobs_failed)
    .bind(exec.jobs_skipped)
    .bind(exec.bytes_transferred)
    .bind(exec.started_at)
    .bind(exec.completed_at)
    .bind(exec.duration_ms)
    .execute(pool)
    .await
    .context("Failed to insert flow execution")?;
    Ok(())
}

pub async fn append_created_job(pool: &Pool<MySql>, execution_id: &str, job_id: &str) -> anyhow::Result<()> {
    sqlx::query(
        r#"UPDATE flow_executions
           SET created_job_ids = JSON_ARRAY_APPEND(created_job_ids, '$', ?), jobs_created = jobs_created + 1
           WHERE id = ?"#,
    )
    .bind(job_id)
    .bind(execution_id)
    .execute(pool)
    .await
    .context("Failed to append created job id to flow execution")?;
    Ok(())
}

pub async fn complete_execution(
    pool: &Pool<MySql>,
    id: &str,
    status: &str,
    jobs_completed: i64,
    jobs_failed: i64,
    jobs_skipped: i64,
    bytes_transferred: i64,
    duration_ms: i64,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"UPDATE flow_executions
           SET status = ?, jobs_completed = ?, jobs_failed = ?, jobs_skipped = ?,
               bytes_transferred = ?, completed_at = NOW(), duration_ms = ?
           WHERE id = ?"#,
    )
    .bind(status)
    .bind(jobs_completed)
    .bind(jobs_failed)
    .bind(jobs_skipped)
    .bind(bytes_transferred)
    .bind(duration_ms)
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to complete flow execution")?;
    Ok(())
}

pub async fn list_executions_for_flow(
    pool: &Pool<MySql>,
    flow_id: &str,
    limit: i64,
) -> anyhow::Result<Vec<FlowExecution>> {
    sqlx::query_as::<_, FlowExecution>(
        "SELECT * FROM flow_executions WHERE flow_id = ? ORDER BY started_at DESC LIMIT ?",
    )
    .bind(flow_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to list flow executions")
}
