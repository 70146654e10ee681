use crate::db::tables::{BackupChain, BackupDisk, BackupJob, VmBackupContext};
use anyhow::Context;
use sqlx::{MySql, Pool};

pub async fn get_or_create_backup_context(
    pool: &Pool<MySql>,
    vm_id: &str,
    repository_id: &str,
    new_id: &str,
) -> anyhow::Result<VmBackupContext> {
    if let Some(existing) = sqlx::query_as::<_, VmBackupContext>(
        "SELECT * FROM vm_backup_contexts WHERE vm_id = ? AND repository_id = ?",
    )
    .bind(vm_id)
    .bind(repository_id)
    .fetch_optional(pool)
    .await
    .context("Failed to look up vm backup context")?
    {
        return Ok(existing);
    }

    sqlx::query(
        r#"INSERT INTO vm_backup_contexts (
            id, vm_id, repository_id, total_backups, total_size_bytes, created_at, updated_at
        ) VALUES (?, ?, ?, 0, 0, NOW(), NOW())"#,
    )
    .bind(new_id)
    .bind(vm_id)
    .bind(repository_id)
    .execute(pool)
    .await
    .context("Failed to create vm backup context")?;

    sqlx::query_as::<_, VmBackupContext>("SELECT * FROM vm_backup_contexts WHERE id = ?")
        .bind(new_id)
        .fetch_one(pool)
        .await
        .context("Failed to reload newly created vm backup context")
}

pub async fn insert_job(pool: &Pool<MySql>, job: &BackupJob) -> anyhow::Result<()> {
    sqlx::query(
        r#"INSERT INTO backup_jobs (
            id, vm_backup_context_id, backup_type, status, parent_job_id,
            started_at, completed_at, created_at, bytes_transferred, bytes_total,
            error_message, metadata
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&job.id)
    .bind(&job.vm_backup_context_id)
    .bind(&job.backup_type)
    .bind(&job.status)
    .bind(&job.parent_job_id)
    .bind(job.started_at)
    .bind(job.completed_at)
    .bind(job.created_at)
    .bind(job.bytes_transferred)
    .bind(job.bytes_total)
    .bind(&job.error_message)
    .bind(&job.metadata)
    .execute(pool)
    .await
    .context("Failed to insert backup job")?;
    Ok(())
}

pub async fn get_job(pool: &Pool<MySql>, id: &str) -> anyhow::Result<BackupJob> {
    sqlx::query_as::<_, BackupJob>("SELECT * FROM backup_jobs WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .context("Failed to fetch backup job")
}

/// Latest completed job for a context, used to find the parent chain id
/// an incremental backup should extend (spec §4.7).
pub async fn latest_completed_job(
    pool: &Pool<MySql>,
    vm_backup_context_id: &str,
) -> anyhow::Result<Option<BackupJob>> {
    sqlx::query_as::<_, BackupJob>(
        r#"SELECT * FROM backup_jobs
           WHERE vm_backup_context_id = ? AND status = 'completed'
           ORDER BY completed_at DESC LIMIT 1"#,
    )
    .bind(vm_backup_context_id)
    .fetch_optional(pool)
    .await
    .context("Failed to fetch latest completed backup job")
}

pub async fn update_job_progress(
    pool: &Pool<MySql>,
    id: &str,
    bytes_transferred: i64,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE backup_jobs SET bytes_transferred = ? WHERE id = ?")
        .bind(bytes_transferred)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update backup job progress")?;
    Ok(())
}

/// sum(per-disk bytes_transferred) for one job — the aggregation spec §4.7
/// requires the parent job's progress to track (numerator of
/// progress = sum(bytes_transferred)/sum(total_bytes)).
pub async fn sum_disk_bytes_transferred(pool: &Pool<MySql>, backup_job_id: &str) -> anyhow::Result<i64> {
    sqlx::query_scalar::<_, Option<i64>>(
        "SELECT SUM(bytes_transferred) FROM backup_disks WHERE backup_job_id = ?",
    )
    .bind(backup_job_id)
    .fetch_one(pool)
    .await
    .context("Failed to sum backup disk bytes transferred")
    .map(|sum| sum.unwrap_or(0))
}

/// Records why a disk was promoted to a full backup under
/// `metadata.promotions.<disk_index>` (spec scenario S4), via an atomic
/// `JSON_SET` so concurrent disk workers on the same job never race on a
/// read-modify-write of the column.
pub async fn record_promotion_reason(
    pool: &Pool<MySql>,
    job_id: &str,
    disk_index: i32,
    reason: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"UPDATE backup_jobs
           SET metadata = JSON_SET(COALESCE(metadata, JSON_OBJECT()), CONCAT('$.promotions.', ?), ?)
           WHERE id = ?"#,
    )
    .bind(disk_index.to_string())
    .bind(reason)
    .bind(job_id)
    .execute(pool)
    .await
    .context("Failed to record backup promotion reason")?;
    Ok(())
}

pub async fn complete_job(
    pool: &Pool<MySql>,
    id: &str,
    status: &str,
    error_message: Option<&str>,
) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE backup_jobs SET status = ?, error_message = ?, completed_at = NOW() WHERE id = ?",
    )
    .bind(status)
    .bind(error_message)
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to complete backup job")?;
    Ok(())
}

pub async fn insert_disk(pool: &Pool<MySql>, disk: &BackupDisk) -> anyhow::Result<()> {
    sqlx::query(
        r#"INSERT INTO backup_disks (
            id, backup_job_id, disk_index, disk_change_id, prior_change_id,
            image_path, size_bytes, status, bytes_transferred, completed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&disk.id)
    .bind(&disk.backup_job_id)
    .bind(disk.disk_index)
    .bind(&disk.disk_change_id)
    .bind(&disk.prior_change_id)
    .bind(&disk.image_path)
    .bind(disk.size_bytes)
    .bind(&disk.status)
    .bind(disk.bytes_transferred)
    .bind(disk.completed_at)
    .execute(pool)
    .await
    .context("Failed to insert backup disk")?;
    Ok(())
}

pub async fn get_disk(pool: &Pool<MySql>, id: &str) -> anyhow::Result<BackupDisk> {
    sqlx::query_as::<_, BackupDisk>("SELECT * FROM backup_disks WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .context("Failed to fetch backup disk")
}

pub async fn list_disks_for_job(
    pool: &Pool<MySql>,
    backup_job_id: &str,
) -> anyhow::Result<Vec<BackupDisk>> {
    sqlx::query_as::<_, BackupDisk>(
        "SELECT * FROM backup_disks WHERE backup_job_id = ? ORDER BY disk_index ASC",
    )
    .bind(backup_job_id)
    .fetch_all(pool)
    .await
    .context("Failed to list backup disks for job")
}

/// Most recent backup disk for a (context, disk_index) pair across all
/// jobs — the chain-extension lookup for incremental backups.
pub async fn latest_disk_for_chain(
    pool: &Pool<MySql>,
    vm_backup_context_id: &str,
    disk_index: i32,
) -> anyhow::Result<Option<BackupDisk>> {
    sqlx::query_as::<_, BackupDisk>(
        r#"SELECT bd.* FROM backup_disks bd
           JOIN backup_jobs bj ON bj.id = bd.backup_job_id
           WHERE bj.vm_backup_context_id = ? AND bd.disk_index = ? AND bd.status = 'completed'
           ORDER BY bd.completed_at DESC LIMIT 1"#,
    )
    .bind(vm_backup_context_id)
    .bind(disk_index)
    .fetch_optional(pool)
    .await
    .context("Failed to fetch latest backup disk for chain")
}

pub async fn complete_disk(
    pool: &Pool<MySql>,
    id: &str,
    status: &str,
    bytes_transferred: i64,
) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE backup_disks SET status = ?, bytes_transferred = ?, completed_at = NOW() WHERE id = ?",
    )
    .bind(status)
    .bind(bytes_transferred)
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to complete backup disk")?;
    Ok(())
}

pub async fn upsert_chain(
    pool: &Pool<MySql>,
    vm_backup_context_id: &str,
    disk_index: i32,
    latest_backup_id: &str,
    size_delta: i64,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"INSERT INTO backup_chains (
            vm_backup_context_id, disk_index, latest_backup_id, total_backups, total_size_bytes
        ) VALUES (?, ?, ?, 1, ?)
        ON DUPLICATE KEY UPDATE
            latest_backup_id = VALUES(latest_backup_id),
            total_backups = total_backups + 1,
            total_size_bytes = total_size_bytes + VALUES(total_size_bytes)"#,
    )
    .bind(vm_backup_context_id)
    .bind(disk_index)
    .bind(latest_backup_id)
    .bind(size_delta)
    .execute(pool)
    .await
    .context("Failed to upsert backup chain")?;
    Ok(())
}

pub async fn get_chain(
    pool: &Pool<MySql>,
    vm_backup_context_id: &str,
    disk_index: i32,
) -> anyhow::Result<Option<BackupChain>> {
    sqlx::query_as::<_, BackupChain>(
        "SELECT * FROM backup_chains WHERE vm_backup_context_id = ? AND disk_index = ?",
    )
    .bind(vm_backup_context_id)
    .bind(disk_index)
    .fetch_optional(pool)
    .await
    .context("Failed to fetch backup chain")
}
