use crate::db::tables::NbdExport;
use anyhow::Context;
use sqlx::{MySql, Pool};

/// Reconciles the `nbd_exports` row for `export.export_name` to match the
/// config-fragment write the Export Manager just made — insert if this is a
/// new export, update `device_path`/`status` in place otherwise, so the DB
/// row and the on-disk fragment never disagree (spec §3 NbdExport invariant).
pub async fn upsert_export(pool: &Pool<MySql>, export: &NbdExport) -> anyhow::Result<()> {
    sqlx::query(
        r#"INSERT INTO nbd_exports (
            id, export_name, device_path, port, status, disk_id, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON DUPLICATE KEY UPDATE
            device_path = VALUES(device_path),
            port = VALUES(port),
            status = VALUES(status),
            updated_at = VALUES(updated_at)"#,
    )
    .bind(&export.id)
    .bind(&export.export_name)
    .bind(&export.device_path)
    .bind(export.port)
    .bind(&export.status)
    .bind(&export.disk_id)
    .bind(export.created_at)
    .bind(export.updated_at)
    .execute(pool)
    .await
    .context("Failed to upsert NBD export")?;
    Ok(())
}

pub async fn delete_export_by_name(pool: &Pool<MySql>, export_name: &str) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM nbd_exports WHERE export_name = ?")
        .bind(export_name)
        .execute(pool)
        .await
        .context("Failed to delete NBD export by name")?;
    Ok(())
}

pub async fn get_export_by_name(
    pool: &Pool<MySql>,
    export_name: &str,
) -> anyhow::Result<Option<NbdExport>> {
    sqlx::query_as::<_, NbdExport>("SELECT * FROM nbd_exports WHERE export_name = ?")
        .bind(export_name)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch NBD export by name")
}

