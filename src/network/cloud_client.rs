// Cloud-side control plane client: volume lifecycle, snapshots, and
// destination VM lifecycle. One long-lived handle owned by the process root
// and injected into the components that need it (spec §9 — no global
// mutable singleton, credentials fetched per call and never cached here).

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudVolumeHandle {
    pub volume_id: String,
    pub size_bytes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudVmSpec {
    pub name: String,
    pub service_offering_id: String,
    pub template_id: String,
    pub zone_id: String,
    pub network_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloudVmState {
    Running,
    Stopped,
    Unknown,
}

/// Control-plane operations the Volume Daemon, Snapshot Service, and
/// Failover Engine drive against the destination cloud. A real
/// implementation talks to the cloud's REST API; tests substitute a fake.
#[async_trait]
pub trait CloudApiClient: Send + Sync {
    async fn create_volume(&self, name: &str, size_bytes: i64, offering: &str, zone: &str) -> Result<CloudVolumeHandle>;
    async fn attach_volume(&self, volume_id: &str, vm_id: &str, as_root: bool) -> Result<()>;
    async fn detach_volume(&self, volume_id: &str) -> Result<()>;
    async fn delete_volume(&self, volume_id: &str) -> Result<()>;

    async fn create_snapshot(&self, volume_id: &str, name: &str) -> Result<String>;
    async fn revert_snapshot(&self, volume_id: &str, snapshot_id: &str) -> Result<()>;
    async fn delete_snapshot(&self, snapshot_id: &str) -> Result<()>;

    async fn create_vm(&self, spec: &CloudVmSpec) -> Result<String>;
    /// Id of the template-provisioned root volume a freshly created VM comes
    /// with, if the template provisions one (spec §4.6 phase 8, "delete
    /// destination's default root").
    async fn default_root_volume(&self, vm_id: &str) -> Result<Option<String>>;
    async fn power_on(&self, vm_id: &str) -> Result<()>;
    async fn power_off(&self, vm_id: &str, force: bool) -> Result<()>;
    async fn vm_state(&self, vm_id: &str) -> Result<CloudVmState>;
    async fn delete_vm(&self, vm_id: &str) -> Result<()>;
}
