// db/tables.rs
//
// Row types for every table owned by the SHA orchestration kernel. Every
// primary key is an opaque string id (spec §3): "jobctx-<uuid>",
// "job-<uuid>", "disk-2000", etc. Status fields are kept as plain strings
// rather than SQL enums so a new status never requires a migration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct VmReplicationContext {
    pub id: String,
    pub vm_id: String,
    pub site_id: String,
    pub name: String,
    pub source_vm_id: String,
    pub source_path: Option<String>,
    pub source_datacenter: Option<String>,
    pub source_host: Option<String>,
    pub status: String, // discovered|replicating|ready_for_failover|failed_over_test|failed_over_live|completed|failed|cleanup_required
    pub total_jobs: i64,
    pub successful_jobs: i64,
    pub failed_jobs: i64,
    pub current_job_id: Option<String>,
    pub last_successful_job_id: Option<String>,
    pub enabled: bool,
    pub next_scheduled_at: Option<DateTime<Utc>>,
    pub credential_ref: Option<String>,
    pub cloud_config_ref: Option<String>,
    pub last_operation_summary: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct VmBackupContext {
    pub id: String,
    pub vm_id: String,
    pub repository_id: String,
    pub total_backups: i64,
    pub total_size_bytes: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct ReplicationJob {
    pub id: String,
    pub vm_context_id: String,
    pub status: String, // pending|running|completed|failed|cancelled
    pub bytes_transferred: i64,
    pub bytes_total: i64,
    pub current_operation: Option<String>,
    pub next_change_id: Option<String>,
    pub parent_job_id: Option<String>,
    pub schedule_execution_id: Option<String>,
    pub group_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Disk {
    pub id: String,
    pub job_id: String,
    pub disk_id: String, // "disk-2000", "disk-2001", ...
    pub source_key: String,
    pub size_bytes: i64,
    pub unit_number: i32,
    pub volume_id: Option<String>,
    pub sync_progress_percent: f64,
    pub change_id: Option<String>,
}

impl Disk {
    /// The root disk is load-bearing for failover volume ordering (spec §3).
    pub fn is_root(&self) -> bool {
        self.disk_id == "disk-2000"
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Volume {
    pub id: String, // cloud volume UUID
    pub name: String,
    pub size_bytes: i64,
    pub vm_context_id: String,
    pub snapshot_id: Option<String>,
    pub snapshot_created_at: Option<DateTime<Utc>>,
    pub snapshot_status: String, // none|ready|rollback_complete
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct DeviceMapping {
    pub id: String,
    pub volume_id: String,
    pub mode: String, // hub|failover
    pub attached_vm_id: String,
    pub cloud_device_index: i32,
    pub host_device_path: String,
    pub persistent_device_name: Option<String>,
    pub symlink_path: Option<String>,
    pub cloud_state: String,
    pub host_state: String,
    pub size_bytes: i64,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeviceMapping {
    pub fn is_placeholder(&self) -> bool {
        self.host_device_path.starts_with("remote-vm-")
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct NbdExport {
    pub id: String,
    pub export_name: String,
    pub device_path: String,
    pub port: i32,
    pub status: String, // pending|active|failed
    pub disk_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct BackupJob {
    pub id: String,
    pub vm_backup_context_id: String,
    pub backup_type: String, // full|incremental
    pub status: String,      // pending|running|completed|failed
    pub parent_job_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub bytes_transferred: i64,
    pub bytes_total: i64,
    pub error_message: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct BackupDisk {
    pub id: String,
    pub backup_job_id: String,
    pub disk_index: i32,
    pub disk_change_id: Option<String>,
    pub prior_change_id: Option<String>,
    pub image_path: String,
    pub size_bytes: i64,
    pub status: String, // pending|running|completed|failed
    pub bytes_transferred: i64,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct BackupChain {
    pub vm_backup_context_id: String,
    pub disk_index: i32,
    pub latest_backup_id: Option<String>,
    pub total_backups: i64,
    pub total_size_bytes: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct RestoreMount {
    pub id: String,
    pub backup_disk_id: String,
    pub mount_path: String,
    pub loopback_device: String,
    pub filesystem_type: Option<String>,
    pub mode: String, // read-only|read-write
    pub status: String, // mounting|mounted|unmounting|failed|unmounted
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Repository {
    pub id: String,
    pub name: String,
    pub repo_type: String, // local|nfs|smb|s3
    pub config: Value,     // backend-specific connection details
    pub total_size_bytes: i64,
    pub used_size_bytes: i64,
    pub status: String, // active|unreachable
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct ProtectionFlow {
    pub id: String,
    pub name: String,
    pub flow_type: String,   // backup|replication
    pub target_type: String, // vm|group
    pub target_id: String,
    pub enabled: bool,
    pub repository_id: Option<String>,
    pub destination_id: Option<String>,
    pub schedule_cron: Option<String>,
    pub policy_id: Option<String>,
    pub next_execution_at: Option<DateTime<Utc>>,
    pub total_executions: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct FlowExecution {
    pub id: String,
    pub flow_id: String,
    pub status: String, // pending|running|success|warning|error|cancelled
    pub execution_type: String, // manual|scheduled|api
    pub triggered_by: Option<String>,
    pub created_job_ids: Value, // JSON array of strings
    pub jobs_created: i64,
    pub jobs_completed: i64,
    pub jobs_failed: i64,
    pub jobs_skipped: i64,
    pub bytes_transferred: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct VolumeOperation {
    pub id: String,
    pub op_type: String, // create|attach|attach_root|detach|delete|cleanup_test_failover
    pub status: String,  // pending|executing|completed|failed
    pub volume_id: Option<String>,
    pub vm_id: Option<String>,
    pub request: Option<Value>,
    pub response: Option<Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: String,
    pub pairing_code: String,
    pub status: String, // pending_approval|approved|rejected|revoked
    pub sna_fingerprint: Option<String>,
    pub host: Option<String>,
    pub name: Option<String>,
    pub approved_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct TunnelConnection {
    pub id: String,
    pub enrollment_id: String,
    pub connected_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub status: String, // active|disconnected
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct EnrollmentAudit {
    pub id: String,
    pub event_type: String,
    pub enrollment_id: String,
    pub source_ip: Option<String>,
    pub admin_user: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct FailoverJob {
    pub id: String,
    pub vm_context_id: String,
    pub failover_type: String, // live|test
    pub status: String,        // pending|running|completed|failed
    pub destination_vm_id: Option<String>,
    pub vm_spec_snapshot: Option<Value>,
    pub replication_job_id: Option<String>,
    pub network_strategy: String, // production|isolated|custom
    pub virtio_status: Option<String>,
    pub ossea_snapshot_id: Option<String>,
    pub prior_context_status: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct JobLogJob {
    pub id: String,
    pub job_type: String,
    pub operation: String,
    pub owner: String,
    pub context_id: Option<String>,
    pub external_id: Option<String>,
    pub category: String,
    pub status: String, // running|completed|failed
    pub total_steps: i64,
    pub completed_steps: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct JobLogStep {
    pub id: String,
    pub job_id: String,
    pub step_name: String,
    pub status: String, // running|completed|failed
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}
