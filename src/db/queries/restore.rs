use crate::db::tables::RestoreMount;
use anyhow::Context;
use sqlx::{MySql, Pool};

pub async fn insert_mount(pool: &Pool<MySql>, mount: &RestoreMount) -> anyhow::Result<()> {
    sqlx::query(
        r#"INSERT INTO restore_mounts (
            id, backup_disk_id, mount_path, loopback_device, filesystem_type, mode,
            status, created_at, last_accessed_at, expires_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&mount.id)
    .bind(&mount.backup_disk_id)
    .bind(&mount.mount_path)
    .bind(&mount.loopback_device)
    .bind(&mount.filesystem_type)
    .bind(&mount.mode)
    .bind(&mount.status)
    .bind(mount.created_at)
    .bind(mount.last_accessed_at)
    .bind(mount.expires_at)
    .execute(pool)
    .await
    .context("Failed to insert restore mount")?;
    Ok(())
}

pub async fn get_mount(pool: &Pool<MySql>, id: &str) -> anyhow::Result<RestoreMount> {
    sqlx::query_as::<_, RestoreMount>("SELECT * FROM restore_mounts WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .context("Failed to fetch restore mount")
}

pub async fn get_mount_for_disk(
    pool: &Pool<MySql>,
    backup_disk_id: &str,
) -> anyhow::Result<Option<RestoreMount>> {
    sqlx::query_as::<_, RestoreMount>(
        "SELECT * FROM restore_mounts WHERE backup_disk_id = ? AND status = 'mounted'",
    )
    .bind(backup_disk_id)
    .fetch_optional(pool)
    .await
    .context("Failed to fetch restore mount for disk")
}

pub async fn touch(pool: &Pool<MySql>, id: &str, expires_at: chrono::DateTime<chrono::Utc>) -> anyhow::Result<()> {
    sqlx::query("UPDATE restore_mounts SET last_accessed_at = NOW(), expires_at = ? WHERE id = ?")
        .bind(expires_at)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to touch restore mount")?;
    Ok(())
}

pub async fn set_status(pool: &Pool<MySql>, id: &str, status: &str) -> anyhow::Result<()> {
    sqlx::query("UPDATE restore_mounts SET status = ? WHERE id = ?")
        .bind(status)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update restore mount status")?;
    Ok(())
}

/// Mounts past their idle expiry (spec §4.8's sweeper worklist).
pub async fn list_expired(pool: &Pool<MySql>) -> anyhow::Result<Vec<RestoreMount>> {
    sqlx::query_as::<_, RestoreMount>(
        "SELECT * FROM restore_mounts WHERE status = 'mounted' AND expires_at <= NOW()",
    )
    .fetch_all(pool)
    .await
    .context("Failed to list expired restore mounts")
}

pub async fn delete_mount(pool: &Pool<MySql>, id: &str) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM restore_mounts WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete restore mount")?;
    Ok(())
}
