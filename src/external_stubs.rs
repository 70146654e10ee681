// Placeholder implementations of the two external-collaborator traits the
// kernel depends on but does not itself implement (spec §1 Out of scope:
// "the cloud API client library" and the on-wire copy protocol behind
// `DataMover`). A real deployment links a CloudStack-facing client and a
// hypervisor-facing data mover here instead; these exist only so the
// binary has something concrete to wire up and run end to end.

use crate::backup::{DataMover, DiskWriteResult};
use crate::backup::error::BackupError;
use crate::network::cloud_client::{CloudApiClient, CloudVmSpec, CloudVmState, CloudVolumeHandle};
use anyhow::{anyhow, Result};
use async_trait::async_trait;

pub struct UnimplementedCloudClient;

#[async_trait]
impl CloudApiClient for UnimplementedCloudClient {
    async fn create_volume(&self, _name: &str, _size_bytes: i64, _offering: &str, _zone: &str) -> Result<CloudVolumeHandle> {
        Err(anyhow!("cloud API client is not configured for this deployment"))
    }
    async fn attach_volume(&self, _volume_id: &str, _vm_id: &str, _as_root: bool) -> Result<()> {
        Err(anyhow!("cloud API client is not configured for this deployment"))
    }
    async fn detach_volume(&self, _volume_id: &str) -> Result<()> {
        Err(anyhow!("cloud API client is not configured for this deployment"))
    }
    async fn delete_volume(&self, _volume_id: &str) -> Result<()> {
        Err(anyhow!("cloud API client is not configured for this deployment"))
    }
    async fn create_snapshot(&self, _volume_id: &str, _name: &str) -> Result<String> {
        Err(anyhow!("cloud API client is not configured for this deployment"))
    }
    async fn revert_snapshot(&self, _volume_id: &str, _snapshot_id: &str) -> Result<()> {
        Err(anyhow!("cloud API client is not configured for this deployment"))
    }
    async fn delete_snapshot(&self, _snapshot_id: &str) -> Result<()> {
        Err(anyhow!("cloud API client is not configured for this deployment"))
    }
    async fn create_vm(&self, _spec: &CloudVmSpec) -> Result<String> {
        Err(anyhow!("cloud API client is not configured for this deployment"))
    }
    async fn default_root_volume(&self, _vm_id: &str) -> Result<Option<String>> {
        Err(anyhow!("cloud API client is not configured for this deployment"))
    }
    async fn power_on(&self, _vm_id: &str) -> Result<()> {
        Err(anyhow!("cloud API client is not configured for this deployment"))
    }
    async fn power_off(&self, _vm_id: &str, _force: bool) -> Result<()> {
        Err(anyhow!("cloud API client is not configured for this deployment"))
    }
    async fn vm_state(&self, _vm_id: &str) -> Result<CloudVmState> {
        Err(anyhow!("cloud API client is not configured for this deployment"))
    }
    async fn delete_vm(&self, _vm_id: &str) -> Result<()> {
        Err(anyhow!("cloud API client is not configured for this deployment"))
    }
}

pub struct UnimplementedDataMover;

#[async_trait]
impl DataMover for UnimplementedDataMover {
    async fn write_image(
        &self,
        _source_disk_index: i32,
        _parent_image_path: Option<&str>,
        _destination_path: &str,
    ) -> Result<DiskWriteResult, BackupError> {
        Err(BackupError::DataMover("data mover is not configured for this deployment".to_string()))
    }
}
