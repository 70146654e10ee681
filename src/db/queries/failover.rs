use crate::db::tables::FailoverJob;
use anyhow::Context;
use sqlx::{MySql, Pool};

pub async fn insert_job(pool: &Pool<MySql>, job: &FailoverJob) -> anyhow::Result<()> {
    sqlx::query(
        r#"INSERT INTO failover_jobs (
            id, vm_context_id, failover_type, status, destination_vm_id, vm_spec_snapshot,
            replication_job_id, network_strategy, virtio_status, ossea_snapshot_id,
            prior_context_status, created_at, completed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&job.id)
    .bind(&job.vm_context_id)
    .bind(&job.failover_type)
    .bind(&job.status)
    .bind(&job.destination_vm_id)
    .bind(&job.vm_spec_snapshot)
    .bind(&job.replication_job_id)
    .bind(&job.network_strategy)
    .bind(&job.virtio_status)
    .bind(&job.ossea_snapshot_id)
    .bind(&job.prior_context_status)
    .bind(job.created_at)
    .bind(job.completed_at)
    .execute(pool)
    .await
    .context("Failed to insert failover job")?;
    Ok(())
}

pub async fn get_job(pool: &Pool<MySql>, id: &str) -> anyhow::Result<FailoverJob> {
    sqlx::query_as::<_, FailoverJob>("SELECT * FROM failover_jobs WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .context("Failed to fetch failover job")
}

pub async fn latest_for_context(
    pool: &Pool<MySql>,
    vm_context_id: &str,
) -> anyhow::Result<Option<FailoverJob>> {
    sqlx::query_as::<_, FailoverJob>(
        "SELECT * FROM failover_jobs WHERE vm_context_id = ? ORDER BY created_at DESC LIMIT 1",
    )
    .bind(vm_context_id)
    .fetch_optional(pool)
    .await
    .context("Failed to fetch latest failover job for context")
}

pub async fn update_virtio_status(
    pool: &Pool<MySql>,
    id: &str,
    virtio_status: &str,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE failover_jobs SET virtio_status = ? WHERE id = ?")
        .bind(virtio_status)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update failover virtio status")?;
    Ok(())
}

pub async fn set_legacy_snapshot(pool: &Pool<MySql>, id: &str, snapshot_id: &str) -> anyhow::Result<()> {
    sqlx::query("UPDATE failover_jobs SET ossea_snapshot_id = ? WHERE id = ?")
        .bind(snapshot_id)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to set failover legacy snapshot id")?;
    Ok(())
}

pub async fn set_destination_vm(
    pool: &Pool<MySql>,
    id: &str,
    destination_vm_id: &str,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE failover_jobs SET destination_vm_id = ? WHERE id = ?")
        .bind(destination_vm_id)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to set failover destination vm")?;
    Ok(())
}

pub async fn complete_job(pool: &Pool<MySql>, id: &str, status: &str) -> anyhow::Result<()> {
    sqlx::query("UPDATE failover_jobs SET status = ?, completed_at = NOW() WHERE id = ?")
        .bind(status)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to complete failover job")?;
    Ok(())
}
