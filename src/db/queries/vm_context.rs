use crate::db::tables::{Disk, ReplicationJob, VmReplicationContext};
use anyhow::Context;
use sqlx::{MySql, Pool};

pub async fn get_context(pool: &Pool<MySql>, id: &str) -> anyhow::Result<VmReplicationContext> {
    sqlx::query_as::<_, VmReplicationContext>("SELECT * FROM vm_replication_contexts WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .context("Failed to fetch vm replication context")
}

pub async fn get_context_by_vm(
    pool: &Pool<MySql>,
    vm_id: &str,
) -> anyhow::Result<Option<VmReplicationContext>> {
    sqlx::query_as::<_, VmReplicationContext>(
        "SELECT * FROM vm_replication_contexts WHERE vm_id = ?",
    )
    .bind(vm_id)
    .fetch_optional(pool)
    .await
    .context("Failed to fetch vm replication context by vm id")
}

pub async fn list_enabled_contexts(pool: &Pool<MySql>) -> anyhow::Result<Vec<VmReplicationContext>> {
    sqlx::query_as::<_, VmReplicationContext>(
        "SELECT * FROM vm_replication_contexts WHERE enabled = TRUE",
    )
    .fetch_all(pool)
    .await
    .context("Failed to list enabled vm replication contexts")
}

pub async fn insert_context(
    pool: &Pool<MySql>,
    ctx: &VmReplicationContext,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"INSERT INTO vm_replication_contexts (
            id, vm_id, site_id, name, source_vm_id, source_path, source_datacenter,
            source_host, status, total_jobs, successful_jobs, failed_jobs,
            current_job_id, last_successful_job_id, enabled, next_scheduled_at,
            credential_ref, cloud_config_ref, last_operation_summary, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&ctx.id)
    .bind(&ctx.vm_id)
    .bind(&ctx.site_id)
    .bind(&ctx.name)
    .bind(&ctx.source_vm_id)
    .bind(&ctx.source_path)
    .bind(&ctx.source_datacenter)
    .bind(&ctx.source_host)
    .bind(&ctx.status)
    .bind(ctx.total_jobs)
    .bind(ctx.successful_jobs)
    .bind(ctx.failed_jobs)
    .bind(&ctx.current_job_id)
    .bind(&ctx.last_successful_job_id)
    .bind(ctx.enabled)
    .bind(ctx.next_scheduled_at)
    .bind(&ctx.credential_ref)
    .bind(&ctx.cloud_config_ref)
    .bind(&ctx.last_operation_summary)
    .bind(ctx.created_at)
    .bind(ctx.updated_at)
    .execute(pool)
    .await
    .context("Failed to insert vm replication context")?;
    Ok(())
}

pub async fn update_status(pool: &Pool<MySql>, id: &str, status: &str) -> anyhow::Result<()> {
    sqlx::query("UPDATE vm_replication_contexts SET status = ?, updated_at = NOW() WHERE id = ?")
        .bind(status)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update vm replication context status")?;
    Ok(())
}

/// Flips `current_job_id`/`last_successful_job_id` and bumps the job
/// counters at the end of a replication job (spec §4's job lifecycle).
pub async fn record_job_outcome(
    pool: &Pool<MySql>,
    id: &str,
    job_id: &str,
    succeeded: bool,
) -> anyhow::Result<()> {
    if succeeded {
        sqlx::query(
            r#"UPDATE vm_replication_contexts
               SET current_job_id = NULL, last_successful_job_id = ?,
                   total_jobs = total_jobs + 1, successful_jobs = successful_jobs + 1,
                   updated_at = NOW()
               WHERE id = ?"#,
        )
        .bind(job_id)
        .bind(id)
        .execute(pool)
        .await
    } else {
        sqlx::query(
            r#"UPDATE vm_replication_contexts
               SET current_job_id = NULL, total_jobs = total_jobs + 1,
                   failed_jobs = failed_jobs + 1, updated_at = NOW()
               WHERE id = ?"#,
        )
        .bind(id)
        .execute(pool)
        .await
    }
    .context("Failed to record job outcome on vm replication context")?;
    Ok(())
}

pub async fn record_operation_summary(
    pool: &Pool<MySql>,
    id: &str,
    summary: serde_json::Value,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE vm_replication_contexts SET last_operation_summary = ?, updated_at = NOW() WHERE id = ?")
        .bind(summary)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to record vm replication context operation summary")?;
    Ok(())
}

pub async fn insert_job(pool: &Pool<MySql>, job: &ReplicationJob) -> anyhow::Result<()> {
    sqlx::query(
        r#"INSERT INTO replication_jobs (
            id, vm_context_id, status, bytes_transferred, bytes_total,
            current_operation, next_change_id, parent_job_id, schedule_execution_id,
            group_id, started_at, completed_at, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&job.id)
    .bind(&job.vm_context_id)
    .bind(&job.status)
    .bind(job.bytes_transferred)
    .bind(job.bytes_total)
    .bind(&job.current_operation)
    .bind(&job.next_change_id)
    .bind(&job.parent_job_id)
    .bind(&job.schedule_execution_id)
    .bind(&job.group_id)
    .bind(job.started_at)
    .bind(job.completed_at)
    .bind(job.created_at)
    .execute(pool)
    .await
    .context("Failed to insert replication job")?;
    Ok(())
}

pub async fn get_job(pool: &Pool<MySql>, id: &str) -> anyhow::Result<ReplicationJob> {
    sqlx::query_as::<_, ReplicationJob>("SELECT * FROM replication_jobs WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .context("Failed to fetch replication job")
}

/// Most recent completed job for a context, used to resolve the
/// `next_change_id` baseline for an incremental sync (spec §4).
pub async fn latest_completed_job(
    pool: &Pool<MySql>,
    context_id: &str,
) -> anyhow::Result<Option<ReplicationJob>> {
    sqlx::query_as::<_, ReplicationJob>(
        r#"SELECT * FROM replication_jobs
           WHERE vm_context_id = ? AND status = 'completed'
           ORDER BY completed_at DESC LIMIT 1"#,
    )
    .bind(context_id)
    .fetch_optional(pool)
    .await
    .context("Failed to fetch latest completed replication job")
}

pub async fn update_job_progress(
    pool: &Pool<MySql>,
    id: &str,
    bytes_transferred: i64,
    current_operation: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE replication_jobs SET bytes_transferred = ?, current_operation = ? WHERE id = ?",
    )
    .bind(bytes_transferred)
    .bind(current_operation)
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to update replication job progress")?;
    Ok(())
}

pub async fn complete_job(
    pool: &Pool<MySql>,
    id: &str,
    status: &str,
    next_change_id: Option<&str>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"UPDATE replication_jobs
           SET status = ?, next_change_id = ?, completed_at = NOW()
           WHERE id = ?"#,
    )
    .bind(status)
    .bind(next_change_id)
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to complete replication job")?;
    Ok(())
}

pub async fn insert_disk(pool: &Pool<MySql>, disk: &Disk) -> anyhow::Result<()> {
    sqlx::query(
        r#"INSERT INTO disks (
            id, job_id, disk_id, source_key, size_bytes, unit_number,
            volume_id, sync_progress_percent, change_id
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&disk.id)
    .bind(&disk.job_id)
    .bind(&disk.disk_id)
    .bind(&disk.source_key)
    .bind(disk.size_bytes)
    .bind(disk.unit_number)
    .bind(&disk.volume_id)
    .bind(disk.sync_progress_percent)
    .bind(&disk.change_id)
    .execute(pool)
    .await
    .context("Failed to insert disk")?;
    Ok(())
}

pub async fn list_disks_for_job(pool: &Pool<MySql>, job_id: &str) -> anyhow::Result<Vec<Disk>> {
    sqlx::query_as::<_, Disk>("SELECT * FROM disks WHERE job_id = ? ORDER BY unit_number ASC")
        .bind(job_id)
        .fetch_all(pool)
        .await
        .context("Failed to list disks for job")
}

pub async fn update_disk_progress(
    pool: &Pool<MySql>,
    id: &str,
    percent: f64,
    change_id: Option<&str>,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE disks SET sync_progress_percent = ?, change_id = ? WHERE id = ?")
        .bind(percent)
        .bind(change_id)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update disk progress")?;
    Ok(())
}

pub async fn set_disk_volume(pool: &Pool<MySql>, id: &str, volume_id: &str) -> anyhow::Result<()> {
    sqlx::query("UPDATE disks SET volume_id = ? WHERE id = ?")
        .bind(volume_id)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to set disk volume")?;
    Ok(())
}
