use crate::db::tables::{DeviceMapping, Volume, VolumeOperation};
use anyhow::Context;
use sqlx::{MySql, Pool};

pub async fn insert_volume(pool: &Pool<MySql>, volume: &Volume) -> anyhow::Result<()> {
    sqlx::query(
        r#"INSERT INTO volumes (
            id, name, size_bytes, vm_context_id, snapshot_id,
            snapshot_created_at, snapshot_status, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&volume.id)
    .bind(&volume.name)
    .bind(volume.size_bytes)
    .bind(&volume.vm_context_id)
    .bind(&volume.snapshot_id)
    .bind(volume.snapshot_created_at)
    .bind(&volume.snapshot_status)
    .bind(volume.created_at)
    .execute(pool)
    .await
    .context("Failed to insert volume")?;
    Ok(())
}

pub async fn get_volume(pool: &Pool<MySql>, id: &str) -> anyhow::Result<Volume> {
    sqlx::query_as::<_, Volume>("SELECT * FROM volumes WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .context("Failed to fetch volume")
}

pub async fn list_volumes_for_context(
    pool: &Pool<MySql>,
    vm_context_id: &str,
) -> anyhow::Result<Vec<Volume>> {
    sqlx::query_as::<_, Volume>("SELECT * FROM volumes WHERE vm_context_id = ?")
        .bind(vm_context_id)
        .fetch_all(pool)
        .await
        .context("Failed to list volumes for context")
}

/// Volume row is the authoritative source for snapshot state (spec §9 open
/// question): the failover job's `ossea_snapshot_id` is a point-in-time
/// record of what was requested, this row is what actually exists.
pub async fn record_snapshot(
    pool: &Pool<MySql>,
    volume_id: &str,
    snapshot_id: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"UPDATE volumes
           SET snapshot_id = ?, snapshot_created_at = NOW(), snapshot_status = 'ready'
           WHERE id = ?"#,
    )
    .bind(snapshot_id)
    .bind(volume_id)
    .execute(pool)
    .await
    .context("Failed to record volume snapshot")?;
    Ok(())
}

pub async fn mark_rollback_complete(pool: &Pool<MySql>, volume_id: &str) -> anyhow::Result<()> {
    sqlx::query("UPDATE volumes SET snapshot_status = 'rollback_complete' WHERE id = ?")
        .bind(volume_id)
        .execute(pool)
        .await
        .context("Failed to mark volume rollback complete")?;
    Ok(())
}

pub async fn clear_snapshot(pool: &Pool<MySql>, volume_id: &str) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE volumes SET snapshot_id = NULL, snapshot_created_at = NULL, snapshot_status = 'none' WHERE id = ?",
    )
    .bind(volume_id)
    .execute(pool)
    .await
    .context("Failed to clear volume snapshot tracking")?;
    Ok(())
}

/// Flips every device mapping belonging to a context's volumes to `mode`
/// (spec §4.6 phase 4.75, "every device mapping for the context").
pub async fn switch_mode_for_context(
    pool: &Pool<MySql>,
    vm_context_id: &str,
    mode: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"UPDATE device_mappings dm
           JOIN volumes v ON v.id = dm.volume_id
           SET dm.mode = ?, dm.updated_at = NOW()
           WHERE v.vm_context_id = ?"#,
    )
    .bind(mode)
    .bind(vm_context_id)
    .execute(pool)
    .await
    .context("Failed to switch device mapping mode for context")?;
    Ok(())
}

pub async fn insert_device_mapping(
    pool: &Pool<MySql>,
    mapping: &DeviceMapping,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"INSERT INTO device_mappings (
            id, volume_id, mode, attached_vm_id, cloud_device_index, host_device_path,
            persistent_device_name, symlink_path, cloud_state, host_state, size_bytes,
            last_sync_at, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&mapping.id)
    .bind(&mapping.volume_id)
    .bind(&mapping.mode)
    .bind(&mapping.attached_vm_id)
    .bind(mapping.cloud_device_index)
    .bind(&mapping.host_device_path)
    .bind(&mapping.persistent_device_name)
    .bind(&mapping.symlink_path)
    .bind(&mapping.cloud_state)
    .bind(&mapping.host_state)
    .bind(mapping.size_bytes)
    .bind(mapping.last_sync_at)
    .bind(mapping.created_at)
    .bind(mapping.updated_at)
    .execute(pool)
    .await
    .context("Failed to insert device mapping")?;
    Ok(())
}

pub async fn get_mapping_for_volume(
    pool: &Pool<MySql>,
    volume_id: &str,
) -> anyhow::Result<Option<DeviceMapping>> {
    sqlx::query_as::<_, DeviceMapping>("SELECT * FROM device_mappings WHERE volume_id = ?")
        .bind(volume_id)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch device mapping for volume")
}

/// All mappings still carrying a `remote-vm-` placeholder path (spec §4.4):
/// the correlation algorithm's worklist.
pub async fn list_placeholder_mappings(pool: &Pool<MySql>) -> anyhow::Result<Vec<DeviceMapping>> {
    sqlx::query_as::<_, DeviceMapping>(
        "SELECT * FROM device_mappings WHERE host_device_path LIKE 'remote-vm-%'",
    )
    .fetch_all(pool)
    .await
    .context("Failed to list placeholder device mappings")
}

pub async fn resolve_device_path(
    pool: &Pool<MySql>,
    id: &str,
    host_device_path: &str,
    persistent_device_name: &str,
    symlink_path: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"UPDATE device_mappings
           SET host_device_path = ?, persistent_device_name = ?, symlink_path = ?,
               host_state = 'attached', last_sync_at = NOW(), updated_at = NOW()
           WHERE id = ?"#,
    )
    .bind(host_device_path)
    .bind(persistent_device_name)
    .bind(symlink_path)
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to resolve device mapping path")?;
    Ok(())
}

pub async fn delete_mapping(pool: &Pool<MySql>, id: &str) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM device_mappings WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete device mapping")?;
    Ok(())
}

pub async fn insert_operation(pool: &Pool<MySql>, op: &VolumeOperation) -> anyhow::Result<()> {
    sqlx::query(
        r#"INSERT INTO volume_operations (
            id, op_type, status, volume_id, vm_id, request, response, error,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&op.id)
    .bind(&op.op_type)
    .bind(&op.status)
    .bind(&op.volume_id)
    .bind(&op.vm_id)
    .bind(&op.request)
    .bind(&op.response)
    .bind(&op.error)
    .bind(op.created_at)
    .bind(op.updated_at)
    .execute(pool)
    .await
    .context("Failed to insert volume operation")?;
    Ok(())
}

pub async fn complete_operation(
    pool: &Pool<MySql>,
    id: &str,
    status: &str,
    response: Option<serde_json::Value>,
    error: Option<&str>,
) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE volume_operations SET status = ?, response = ?, error = ?, updated_at = NOW() WHERE id = ?",
    )
    .bind(status)
    .bind(response)
    .bind(error)
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to complete volume operation")?;
    Ok(())
}

pub async fn mark_operation_executing(pool: &Pool<MySql>, id: &str) -> anyhow::Result<()> {
    sqlx::query("UPDATE volume_operations SET status = 'executing', updated_at = NOW() WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to mark volume operation executing")?;
    Ok(())
}

pub async fn get_operation(pool: &Pool<MySql>, id: &str) -> anyhow::Result<VolumeOperation> {
    sqlx::query_as::<_, VolumeOperation>("SELECT * FROM volume_operations WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .context("Failed to fetch volume operation")
}

pub async fn list_pending_operations(pool: &Pool<MySql>) -> anyhow::Result<Vec<VolumeOperation>> {
    sqlx::query_as::<_, VolumeOperation>(
        "SELECT * FROM volume_operations WHERE status IN ('pending', 'executing') ORDER BY created_at ASC",
    )
    .fetch_all(pool)
    .await
    .context("Failed to list pending volume operations")
}
