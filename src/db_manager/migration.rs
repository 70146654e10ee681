use crate::db_manager::error::DatabaseError;
use colored::Colorize;
use log::info;
use sqlx::{MySql, Pool};

/// Brings the schema up to date by issuing idempotent `CREATE TABLE IF NOT
/// EXISTS` statements for every table the kernel owns. This is not a
/// general migrations system — there is no versioning or rollback, only
/// the bootstrap a single-appliance service needs on first boot.
pub struct MigrationManager;

impl MigrationManager {
    pub async fn initialize_schema(pool: &Pool<MySql>) -> Result<(), DatabaseError> {
        info!("{}", "Initializing database schema...".cyan());

        for (name, ddl) in Self::statements() {
            sqlx::query(ddl)
                .execute(pool)
                .await
                .map_err(|e| DatabaseError::MigrationError(format!("{}: {}", name, e)))?;
            info!("✓ table ready: {}", name);
        }

        info!("{}", "Schema initialized".green());
        Ok(())
    }

    fn statements() -> Vec<(&'static str, &'static str)> {
        vec![
            ("vm_replication_contexts", r#"
                CREATE TABLE IF NOT EXISTS vm_replication_contexts (
                    id VARCHAR(64) PRIMARY KEY,
                    vm_id VARCHAR(64) NOT NULL,
                    site_id VARCHAR(64) NOT NULL,
                    name VARCHAR(255) NOT NULL,
                    source_vm_id VARCHAR(128) NOT NULL,
                    source_path VARCHAR(512),
                    source_datacenter VARCHAR(255),
                    source_host VARCHAR(255),
                    status VARCHAR(32) NOT NULL,
                    total_jobs BIGINT NOT NULL DEFAULT 0,
                    successful_jobs BIGINT NOT NULL DEFAULT 0,
                    failed_jobs BIGINT NOT NULL DEFAULT 0,
                    current_job_id VARCHAR(64),
                    last_successful_job_id VARCHAR(64),
                    enabled BOOLEAN NOT NULL DEFAULT TRUE,
                    next_scheduled_at DATETIME,
                    credential_ref VARCHAR(255),
                    cloud_config_ref VARCHAR(255),
                    last_operation_summary JSON,
                    created_at DATETIME NOT NULL,
                    updated_at DATETIME NOT NULL,
                    INDEX idx_vrc_vm (vm_id)
                )
            "#),
            ("vm_backup_contexts", r#"
                CREATE TABLE IF NOT EXISTS vm_backup_contexts (
                    id VARCHAR(64) PRIMARY KEY,
                    vm_id VARCHAR(64) NOT NULL,
                    repository_id VARCHAR(64) NOT NULL,
                    total_backups BIGINT NOT NULL DEFAULT 0,
                    total_size_bytes BIGINT NOT NULL DEFAULT 0,
                    created_at DATETIME NOT NULL,
                    updated_at DATETIME NOT NULL,
                    INDEX idx_vbc_vm (vm_id)
                )
            "#),
            ("replication_jobs", r#"
                CREATE TABLE IF NOT EXISTS replication_jobs (
                    id VARCHAR(64) PRIMARY KEY,
                    vm_context_id VARCHAR(64) NOT NULL,
                    status VARCHAR(32) NOT NULL,
                    bytes_transferred BIGINT NOT NULL DEFAULT 0,
                    bytes_total BIGINT NOT NULL DEFAULT 0,
                    current_operation VARCHAR(255),
                    next_change_id VARCHAR(128),
                    parent_job_id VARCHAR(64),
                    schedule_execution_id VARCHAR(64),
                    group_id VARCHAR(64),
                    started_at DATETIME,
                    completed_at DATETIME,
                    created_at DATETIME NOT NULL,
                    INDEX idx_rj_context (vm_context_id),
                    INDEX idx_rj_status (status)
                )
            "#),
            ("disks", r#"
                CREATE TABLE IF NOT EXISTS disks (
                    id VARCHAR(64) PRIMARY KEY,
                    job_id VARCHAR(64) NOT NULL,
                    disk_id VARCHAR(32) NOT NULL,
                    source_key VARCHAR(255) NOT NULL,
                    size_bytes BIGINT NOT NULL,
                    unit_number INT NOT NULL,
                    volume_id VARCHAR(64),
                    sync_progress_percent DOUBLE NOT NULL DEFAULT 0,
                    change_id VARCHAR(128),
                    INDEX idx_disks_job (job_id)
                )
            "#),
            ("volumes", r#"
                CREATE TABLE IF NOT EXISTS volumes (
                    id VARCHAR(64) PRIMARY KEY,
                    name VARCHAR(255) NOT NULL,
                    size_bytes BIGINT NOT NULL,
                    vm_context_id VARCHAR(64) NOT NULL,
                    snapshot_id VARCHAR(64),
                    snapshot_created_at DATETIME,
                    snapshot_status VARCHAR(32) NOT NULL DEFAULT 'none',
                    created_at DATETIME NOT NULL,
                    INDEX idx_volumes_context (vm_context_id)
                )
            "#),
            ("device_mappings", r#"
                CREATE TABLE IF NOT EXISTS device_mappings (
                    id VARCHAR(64) PRIMARY KEY,
                    volume_id VARCHAR(64) NOT NULL,
                    mode VARCHAR(16) NOT NULL,
                    attached_vm_id VARCHAR(64) NOT NULL,
                    cloud_device_index INT NOT NULL,
                    host_device_path VARCHAR(255) NOT NULL,
                    persistent_device_name VARCHAR(255),
                    symlink_path VARCHAR(255),
                    cloud_state VARCHAR(32) NOT NULL,
                    host_state VARCHAR(32) NOT NULL,
                    size_bytes BIGINT NOT NULL,
                    last_sync_at DATETIME,
                    created_at DATETIME NOT NULL,
                    updated_at DATETIME NOT NULL,
                    UNIQUE KEY uq_dm_volume (volume_id),
                    INDEX idx_dm_vm (attached_vm_id)
                )
            "#),
            ("nbd_exports", r#"
                CREATE TABLE IF NOT EXISTS nbd_exports (
                    id VARCHAR(64) PRIMARY KEY,
                    export_name VARCHAR(255) NOT NULL UNIQUE,
                    device_path VARCHAR(255) NOT NULL,
                    port INT NOT NULL,
                    status VARCHAR(16) NOT NULL,
                    disk_id VARCHAR(64),
                    created_at DATETIME NOT NULL,
                    updated_at DATETIME NOT NULL
                )
            "#),
            ("backup_repositories", r#"
                CREATE TABLE IF NOT EXISTS backup_repositories (
                    id VARCHAR(64) PRIMARY KEY,
                    name VARCHAR(255) NOT NULL,
                    repo_type VARCHAR(16) NOT NULL,
                    config JSON NOT NULL,
                    total_size_bytes BIGINT NOT NULL DEFAULT 0,
                    used_size_bytes BIGINT NOT NULL DEFAULT 0,
                    status VARCHAR(16) NOT NULL,
                    created_at DATETIME NOT NULL,
                    updated_at DATETIME NOT NULL
                )
            "#),
            ("backup_jobs", r#"
                CREATE TABLE IF NOT EXISTS backup_jobs (
                    id VARCHAR(64) PRIMARY KEY,
                    vm_backup_context_id VARCHAR(64) NOT NULL,
                    backup_type VARCHAR(16) NOT NULL,
                    status VARCHAR(32) NOT NULL,
                    parent_job_id VARCHAR(64),
                    started_at DATETIME,
                    completed_at DATETIME,
                    created_at DATETIME NOT NULL,
                    bytes_transferred BIGINT NOT NULL DEFAULT 0,
                    bytes_total BIGINT NOT NULL DEFAULT 0,
                    error_message TEXT,
                    metadata JSON,
                    INDEX idx_bj_context (vm_backup_context_id),
                    INDEX idx_bj_parent (parent_job_id)
                )
            "#),
            ("backup_disks", r#"
                CREATE TABLE IF NOT EXISTS backup_disks (
                    id VARCHAR(64) PRIMARY KEY,
                    backup_job_id VARCHAR(64) NOT NULL,
                    disk_index INT NOT NULL,
                    disk_change_id VARCHAR(128),
                    prior_change_id VARCHAR(128),
                    image_path VARCHAR(512) NOT NULL,
                    size_bytes BIGINT NOT NULL DEFAULT 0,
                    status VARCHAR(32) NOT NULL,
                    bytes_transferred BIGINT NOT NULL DEFAULT 0,
                    completed_at DATETIME,
                    INDEX idx_bd_job (backup_job_id)
                )
            "#),
            ("backup_chains", r#"
                CREATE TABLE IF NOT EXISTS backup_chains (
                    vm_backup_context_id VARCHAR(64) NOT NULL,
                    disk_index INT NOT NULL,
                    latest_backup_id VARCHAR(64),
                    total_backups BIGINT NOT NULL DEFAULT 0,
                    total_size_bytes BIGINT NOT NULL DEFAULT 0,
                    PRIMARY KEY (vm_backup_context_id, disk_index)
                )
            "#),
            ("restore_mounts", r#"
                CREATE TABLE IF NOT EXISTS restore_mounts (
                    id VARCHAR(64) PRIMARY KEY,
                    backup_disk_id VARCHAR(64) NOT NULL,
                    mount_path VARCHAR(512) NOT NULL,
                    loopback_device VARCHAR(64) NOT NULL,
                    filesystem_type VARCHAR(32),
                    mode VARCHAR(16) NOT NULL,
                    status VARCHAR(16) NOT NULL,
                    created_at DATETIME NOT NULL,
                    last_accessed_at DATETIME NOT NULL,
                    expires_at DATETIME NOT NULL,
                    INDEX idx_rm_expires (expires_at)
                )
            "#),
            ("protection_flows", r#"
                CREATE TABLE IF NOT EXISTS protection_flows (
                    id VARCHAR(64) PRIMARY KEY,
                    name VARCHAR(255) NOT NULL,
                    flow_type VARCHAR(16) NOT NULL,
                    target_type VARCHAR(16) NOT NULL,
                    target_id VARCHAR(64) NOT NULL,
                    enabled BOOLEAN NOT NULL DEFAULT TRUE,
                    repository_id VARCHAR(64),
                    destination_id VARCHAR(64),
                    schedule_cron VARCHAR(128),
                    policy_id VARCHAR(64),
                    next_execution_at DATETIME,
                    total_executions BIGINT NOT NULL DEFAULT 0,
                    created_at DATETIME NOT NULL,
                    updated_at DATETIME NOT NULL,
                    INDEX idx_pf_next (next_execution_at)
                )
            "#),
            ("flow_executions", r#"
                CREATE TABLE IF NOT EXISTS flow_executions (
                    id VARCHAR(64) PRIMARY KEY,
                    flow_id VARCHAR(64) NOT NULL,
                    status VARCHAR(16) NOT NULL,
                    execution_type VARCHAR(16) NOT NULL,
                    triggered_by VARCHAR(255),
                    created_job_ids JSON NOT NULL,
                    jobs_created BIGINT NOT NULL DEFAULT 0,
                    jobs_completed BIGINT NOT NULL DEFAULT 0,
                    jobs_failed BIGINT NOT NULL DEFAULT 0,
                    jobs_skipped BIGINT NOT NULL DEFAULT 0,
                    bytes_transferred BIGINT NOT NULL DEFAULT 0,
                    started_at DATETIME NOT NULL,
                    completed_at DATETIME,
                    duration_ms BIGINT,
                    INDEX idx_fe_flow (flow_id)
                )
            "#),
            ("volume_operations", r#"
                CREATE TABLE IF NOT EXISTS volume_operations (
                    id VARCHAR(64) PRIMARY KEY,
                    op_type VARCHAR(32) NOT NULL,
                    status VARCHAR(16) NOT NULL,
                    volume_id VARCHAR(64),
                    vm_id VARCHAR(64),
                    request JSON,
                    response JSON,
                    error TEXT,
                    created_at DATETIME NOT NULL,
                    updated_at DATETIME NOT NULL,
                    INDEX idx_vo_volume (volume_id)
                )
            "#),
            ("enrollments", r#"
                CREATE TABLE IF NOT EXISTS enrollments (
                    id VARCHAR(64) PRIMARY KEY,
                    pairing_code VARCHAR(32) NOT NULL UNIQUE,
                    status VARCHAR(32) NOT NULL,
                    sna_fingerprint VARCHAR(255),
                    host VARCHAR(255),
                    name VARCHAR(255),
                    approved_by VARCHAR(255),
                    created_at DATETIME NOT NULL,
                    updated_at DATETIME NOT NULL,
                    expires_at DATETIME NOT NULL
                )
            "#),
            ("tunnel_connections", r#"
                CREATE TABLE IF NOT EXISTS tunnel_connections (
                    id VARCHAR(64) PRIMARY KEY,
                    enrollment_id VARCHAR(64) NOT NULL,
                    connected_at DATETIME NOT NULL,
                    last_seen_at DATETIME NOT NULL,
                    status VARCHAR(16) NOT NULL,
                    INDEX idx_tc_enrollment (enrollment_id)
                )
            "#),
            ("enrollment_audit", r#"
                CREATE TABLE IF NOT EXISTS enrollment_audit (
                    id VARCHAR(64) PRIMARY KEY,
                    event_type VARCHAR(64) NOT NULL,
                    enrollment_id VARCHAR(64) NOT NULL,
                    source_ip VARCHAR(64),
                    admin_user VARCHAR(255),
                    created_at DATETIME NOT NULL,
                    INDEX idx_ea_enrollment (enrollment_id)
                )
            "#),
            ("failover_jobs", r#"
                CREATE TABLE IF NOT EXISTS failover_jobs (
                    id VARCHAR(64) PRIMARY KEY,
                    vm_context_id VARCHAR(64) NOT NULL,
                    failover_type VARCHAR(16) NOT NULL,
                    status VARCHAR(32) NOT NULL,
                    destination_vm_id VARCHAR(64),
                    vm_spec_snapshot JSON,
                    replication_job_id VARCHAR(64),
                    network_strategy VARCHAR(16) NOT NULL,
                    virtio_status VARCHAR(32),
                    ossea_snapshot_id VARCHAR(64),
                    prior_context_status VARCHAR(32),
                    created_at DATETIME NOT NULL,
                    completed_at DATETIME,
                    INDEX idx_fj_context (vm_context_id)
                )
            "#),
            ("job_log_jobs", r#"
                CREATE TABLE IF NOT EXISTS job_log_jobs (
                    id VARCHAR(64) PRIMARY KEY,
                    job_type VARCHAR(64) NOT NULL,
                    operation VARCHAR(128) NOT NULL,
                    owner VARCHAR(64) NOT NULL,
                    context_id VARCHAR(64),
                    external_id VARCHAR(128),
                    category VARCHAR(32) NOT NULL,
                    status VARCHAR(16) NOT NULL,
                    total_steps BIGINT NOT NULL DEFAULT 0,
                    completed_steps BIGINT NOT NULL DEFAULT 0,
                    started_at DATETIME NOT NULL,
                    ended_at DATETIME,
                    error TEXT,
                    INDEX idx_jlj_context (context_id),
                    INDEX idx_jlj_started (started_at)
                )
            "#),
            ("job_log_steps", r#"
                CREATE TABLE IF NOT EXISTS job_log_steps (
                    id VARCHAR(64) PRIMARY KEY,
                    job_id VARCHAR(64) NOT NULL,
                    step_name VARCHAR(128) NOT NULL,
                    status VARCHAR(16) NOT NULL,
                    started_at DATETIME NOT NULL,
                    ended_at DATETIME,
                    error TEXT,
                    INDEX idx_jls_job (job_id)
                )
            "#),
        ]
    }
}
