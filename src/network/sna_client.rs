// Typed calls through the SNA-initiated reverse tunnel (spec §4.12). The
// hand-off from enrollment approval to the tunnel becoming reachable is
// treated as a precondition external to this client (spec §9 open question).

use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredVm {
    pub vm_id: String,
    pub name: String,
    pub path: String,
    pub power_state: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmPowerState {
    PoweredOn,
    PoweredOff,
    Unknown,
}

/// Reaches the source-side agent through its reverse tunnel, which
/// terminates at a fixed loopback endpoint once established.
pub struct SnaClient {
    http: reqwest::Client,
    tunnel_base_url: String,
}

impl SnaClient {
    pub fn new(tunnel_base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            tunnel_base_url,
        }
    }

    pub async fn discover(
        &self,
        host: &str,
        user: &str,
        password: &str,
        datacenter: &str,
        filter: Option<&str>,
    ) -> Result<Vec<DiscoveredVm>> {
        let resp = self
            .http
            .post(format!("{}/discover", self.tunnel_base_url))
            .json(&serde_json::json!({
                "host": host,
                "user": user,
                "password": password,
                "datacenter": datacenter,
                "filter": filter,
            }))
            .send()
            .await
            .context("SNA discover call failed")?;
        resp.json::<Vec<DiscoveredVm>>()
            .await
            .context("failed to parse SNA discover response")
    }

    pub async fn vm_power_on(&self, vm_id: &str) -> Result<()> {
        self.post_command(vm_id, "power-on").await
    }

    /// Graceful by default with an explicit timeout and polling loop;
    /// `force=true` requests immediate power-off.
    pub async fn vm_power_off(&self, vm_id: &str, force: bool, timeout: Duration) -> Result<()> {
        if force {
            return self.post_command(vm_id, "power-off-force").await;
        }

        self.post_command(vm_id, "power-off-graceful").await?;

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() >= deadline {
                warn!("SNA: graceful power-off of {} timed out, forcing", vm_id);
                return self.post_command(vm_id, "power-off-force").await;
            }
            if self.vm_state(vm_id).await? == VmPowerState::PoweredOff {
                return Ok(());
            }
            sleep(Duration::from_secs(2)).await;
        }
    }

    pub async fn vm_state(&self, vm_id: &str) -> Result<VmPowerState> {
        let resp = self
            .http
            .get(format!("{}/vms/{}/state", self.tunnel_base_url, vm_id))
            .send()
            .await
            .context("SNA vm state call failed")?;
        let body: Value = resp.json().await.context("failed to parse SNA state response")?;
        match body.get("state").and_then(Value::as_str) {
            Some("poweredOn") => Ok(VmPowerState::PoweredOn),
            Some("poweredOff") => Ok(VmPowerState::PoweredOff),
            _ => Ok(VmPowerState::Unknown),
        }
    }

    /// Kicks off an incremental sync on the source side for a job already
    /// created in `replication_jobs`; the SNA reports progress back through
    /// `update_progress` as the copy proceeds.
    pub async fn trigger_final_sync(&self, vm_id: &str, job_id: &str) -> Result<()> {
        let resp = self
            .http
            .post(format!("{}/vms/{}/sync", self.tunnel_base_url, vm_id))
            .json(&serde_json::json!({"job_id": job_id}))
            .send()
            .await
            .context("SNA trigger final sync call failed")?;
        if !resp.status().is_success() {
            return Err(anyhow!("SNA trigger final sync returned {}", resp.status()));
        }
        Ok(())
    }

    /// Injects guest drivers (VirtIO) into the root disk image ahead of
    /// destination VM boot.
    pub async fn inject_virtio_drivers(&self, vm_id: &str) -> Result<()> {
        self.post_command(vm_id, "inject-virtio").await
    }

    pub async fn cbt_status(&self, vm_path: &str) -> Result<bool> {
        let resp = self
            .http
            .get(format!("{}/cbt-status", self.tunnel_base_url))
            .query(&[("path", vm_path)])
            .send()
            .await
            .context("SNA CBT status call failed")?;
        let body: Value = resp.json().await.context("failed to parse CBT status response")?;
        Ok(body.get("enabled").and_then(Value::as_bool).unwrap_or(false))
    }

    pub async fn update_progress(&self, job_id: &str, payload: Value) -> Result<()> {
        self.http
            .post(format!("{}/jobs/{}/progress", self.tunnel_base_url, job_id))
            .json(&payload)
            .send()
            .await
            .context("SNA update progress call failed")?;
        Ok(())
    }

    pub async fn get_progress(&self, job_id: &str) -> Result<Value> {
        let resp = self
            .http
            .get(format!("{}/jobs/{}/progress", self.tunnel_base_url, job_id))
            .send()
            .await
            .context("SNA get progress call failed")?;
        resp.json().await.context("failed to parse SNA progress response")
    }

    async fn post_command(&self, vm_id: &str, command: &str) -> Result<()> {
        debug!("SNA: sending {} to {}", command, vm_id);
        let resp = self
            .http
            .post(format!("{}/vms/{}/{}", self.tunnel_base_url, vm_id, command))
            .send()
            .await
            .with_context(|| format!("SNA {} call failed for {}", command, vm_id))?;
        if !resp.status().is_success() {
            return Err(anyhow!("SNA {} returned {}", command, resp.status()));
        }
        Ok(())
    }
}
