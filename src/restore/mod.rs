pub mod error;

use crate::db::queries::{backup as bqueries, restore as queries};
use crate::db::tables::RestoreMount;
use crate::nbd::NbdExportManager;
use chrono::{Duration as ChronoDuration, Utc};
use error::RestoreError;
use log::{info, warn};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Mutex;
use uuid::Uuid;

const LOOPBACK_DEVICE_CAPACITY: usize = 32;

struct LoopbackAllocator {
    in_use: HashSet<usize>,
}

impl LoopbackAllocator {
    fn new() -> Self {
        Self { in_use: HashSet::new() }
    }

    fn allocate(&mut self) -> Option<usize> {
        let next = (0..LOOPBACK_DEVICE_CAPACITY).find(|i| !self.in_use.contains(i))?;
        self.in_use.insert(next);
        Some(next)
    }

    fn release(&mut self, index: usize) {
        self.in_use.remove(&index);
    }
}

/// Mounts backup disk images as read-only local block devices for
/// file-level restore (spec §4.8). Reuses the NBD Export Manager (C3) to
/// expose the image file, then attaches it loopback with `nbd-client` —
/// the same mechanism the Volume Daemon uses for live volumes, pointed at
/// a flat image file instead of a host device node. An incremental image's
/// parent chain is carried inside the image format itself (the data mover
/// writes deltas referencing the parent path at backup time), so mounting
/// the leaf disk's image is sufficient here.
pub struct RestoreEngine {
    pool: sqlx::Pool<sqlx::MySql>,
    nbd: Arc<NbdExportManager>,
    nbd_host: String,
    nbd_port: u16,
    mount_root: PathBuf,
    idle_expiry: ChronoDuration,
    loopback: Arc<Mutex<LoopbackAllocator>>,
}

impl RestoreEngine {
    pub fn new(
        pool: sqlx::Pool<sqlx::MySql>,
        nbd: Arc<NbdExportManager>,
        nbd_host: String,
        nbd_port: u16,
        mount_root: impl Into<PathBuf>,
        idle_expiry_seconds: i64,
    ) -> Self {
        Self {
            pool,
            nbd,
            nbd_host,
            nbd_port,
            mount_root: mount_root.into(),
            idle_expiry: ChronoDuration::seconds(idle_expiry_seconds),
            loopback: Arc::new(Mutex::new(LoopbackAllocator::new())),
        }
    }

    /// Idempotent on `backup_disk_id`: a disk already mounted returns its
    /// existing mount row unchanged.
    pub async fn mount(&self, backup_disk_id: &str, mode: &str) -> Result<RestoreMount, RestoreError> {
        if let Some(existing) = queries::get_mount_for_disk(&self.pool, backup_disk_id)
            .await
            .map_err(|e| RestoreError::Persistence(e.to_string()))?
        {
            return Ok(existing);
        }

        let disk = bqueries::get_disk(&self.pool, backup_disk_id)
            .await
            .map_err(|_| RestoreError::DiskNotFound(backup_disk_id.to_string()))?;

        let loop_index = {
            let mut allocator = self.loopback.lock().await;
            allocator.allocate().ok_or(RestoreError::AllocationExhausted)?
        };
        let device_path = format!("/dev/nbd{}", loop_index);
        let mount_id = format!("restoremount-{}", Uuid::new_v4());
        let export_name = format!("restore-{}", mount_id);

        let result = self.attach_and_mount(&export_name, &disk.image_path, &device_path, &mount_id).await;
        let (mount_path, filesystem_type) = match result {
            Ok(v) => v,
            Err(e) => {
                self.loopback.lock().await.release(loop_index);
                return Err(e);
            }
        };

        let now = Utc::now();
        let mount = RestoreMount {
            id: mount_id,
            backup_disk_id: backup_disk_id.to_string(),
            mount_path,
            loopback_device: device_path,
            filesystem_type: Some(filesystem_type),
            mode: mode.to_string(),
            status: "mounted".to_string(),
            created_at: now,
            last_accessed_at: now,
            expires_at: now + self.idle_expiry,
        };
        queries::insert_mount(&self.pool, &mount)
            .await
            .map_err(|e| RestoreError::Persistence(e.to_string()))?;
        info!("restore engine: mounted {} at {}", backup_disk_id, mount.mount_path);
        Ok(mount)
    }

    async fn attach_and_mount(
        &self,
        export_name: &str,
        image_path: &str,
        device_path: &str,
        mount_id: &str,
    ) -> Result<(String, String), RestoreError> {
        self.nbd
            .add_export(export_name, image_path, true)
            .await
            .map_err(|e| RestoreError::Mount(format!("nbd export failed: {}", e)))?;

        run(Command::new("nbd-client").args([
            self.nbd_host.as_str(),
            &self.nbd_port.to_string(),
            device_path,
            "-N",
            export_name,
            "-readonly",
        ]))
        .await?;

        let filesystem_type = self.probe_filesystem(device_path).await?;

        let mount_path = self.mount_root.join(mount_id);
        tokio::fs::create_dir_all(&mount_path)
            .await
            .map_err(|e| RestoreError::Mount(format!("creating mount dir: {}", e)))?;
        run(Command::new("mount").args(["-o", "ro", device_path, mount_path.to_str().unwrap_or_default()])).await?;

        Ok((mount_path.to_string_lossy().to_string(), filesystem_type))
    }

    async fn probe_filesystem(&self, device_path: &str) -> Result<String, RestoreError> {
        let output = Command::new("blkid")
            .args(["-o", "value", "-s", "TYPE", device_path])
            .output()
            .await
            .map_err(|e| RestoreError::Mount(format!("blkid failed: {}", e)))?;
        let fs_type = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if fs_type.is_empty() {
            Ok("unknown".to_string())
        } else {
            Ok(fs_type)
        }
    }

    /// `Browse`/`Stream` share this: every access refreshes the idle clock.
    pub async fn touch(&self, mount_id: &str) -> Result<(), RestoreError> {
        let expires_at = Utc::now() + self.idle_expiry;
        queries::touch(&self.pool, mount_id, expires_at)
            .await
            .map_err(|e| RestoreError::Persistence(e.to_string()))
    }

    pub async fn unmount(&self, mount_id: &str) -> Result<(), RestoreError> {
        let mount = match queries::get_mount(&self.pool, mount_id).await {
            Ok(mount) => mount,
            Err(_) => return Ok(()), // idempotent: nothing to unmount
        };
        if mount.status == "unmounted" {
            return Ok(());
        }
        self.teardown(&mount).await
    }

    async fn teardown(&self, mount: &RestoreMount) -> Result<(), RestoreError> {
        queries::set_status(&self.pool, &mount.id, "unmounting")
            .await
            .map_err(|e| RestoreError::Persistence(e.to_string()))?;

        if let Err(e) = run(Command::new("umount").arg(&mount.mount_path)).await {
            warn!("restore engine: umount of {} failed, continuing cleanup: {}", mount.mount_path, e);
        }
        if let Err(e) = run(Command::new("nbd-client").args(["-d", &mount.loopback_device])).await {
            warn!("restore engine: nbd-client disconnect of {} failed: {}", mount.loopback_device, e);
        }
        let export_name = format!("restore-{}", mount.id);
        if let Err(e) = self.nbd.remove_export(&export_name).await {
            warn!("restore engine: failed to remove nbd export {}: {}", export_name, e);
        }

        if let Some(index) = mount.loopback_device.trim_start_matches("/dev/nbd").parse::<usize>().ok() {
            self.loopback.lock().await.release(index);
        }

        queries::set_status(&self.pool, &mount.id, "unmounted")
            .await
            .map_err(|e| RestoreError::Persistence(e.to_string()))?;
        Ok(())
    }

    /// Background sweeper: every minute, unmount anything idle past its
    /// expiry (spec §4.8). Intended to run as a long-lived `tokio::spawn`.
    pub async fn sweep_expired(&self) -> Result<usize, RestoreError> {
        let expired = queries::list_expired(&self.pool)
            .await
            .map_err(|e| RestoreError::Persistence(e.to_string()))?;
        let count = expired.len();
        for mount in expired {
            if let Err(e) = self.teardown(&mount).await {
                warn!("restore engine: failed to sweep expired mount {}: {}", mount.id, e);
            }
        }
        Ok(count)
    }

    pub async fn run_sweeper_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            match self.sweep_expired().await {
                Ok(0) => {}
                Ok(n) => info!("restore engine: swept {} expired mount(s)", n),
                Err(e) => warn!("restore engine: sweep failed: {}", e),
            }
        }
    }
}

async fn run(cmd: &mut Command) -> Result<(), RestoreError> {
    let status = cmd.status().await.map_err(|e| RestoreError::Mount(e.to_string()))?;
    if !status.success() {
        return Err(RestoreError::Mount(format!("command exited with {}", status)));
    }
    Ok(())
}
