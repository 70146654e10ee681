pub mod error;

use crate::db::queries::nbd as queries;
use crate::db::tables::NbdExport;
use chrono::Utc;
use error::NbdError;
use log::{info, warn};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use sqlx::{MySql, Pool};
use std::path::PathBuf;
use tokio::fs;
use uuid::Uuid;

/// Export name always present on the shared NBD server so it never
/// advertises zero exports (spec §4.3, §6).
pub const PLACEHOLDER_EXPORT: &str = "placeholder";

#[derive(Debug, Clone)]
pub struct ExportInfo {
    pub name: String,
    pub device_path: String,
    pub read_only: bool,
}

/// Owns the per-export configuration fragment directory for the single
/// shared NBD server process and its reload signal (spec §4.3).
pub struct NbdExportManager {
    pool: Pool<MySql>,
    port: i32,
    conf_dir: PathBuf,
    pid_file: PathBuf,
}

impl NbdExportManager {
    pub fn new(
        pool: Pool<MySql>,
        port: u16,
        conf_dir: impl Into<PathBuf>,
        pid_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pool,
            port: port as i32,
            conf_dir: conf_dir.into(),
            pid_file: pid_file.into(),
        }
    }

    pub fn export_name_for_volume(volume_uuid: &str) -> String {
        format!("migration-vol-{}", volume_uuid)
    }

    /// Writes the fragment for `name` atomically and reloads the server.
    /// Idempotent on `(name, device_path)` — a fragment already pointing at
    /// `device_path` is left untouched and the reload is skipped.
    pub async fn add_export(
        &self,
        name: &str,
        device_path: &str,
        read_only: bool,
    ) -> Result<(), NbdError> {
        if let Some(existing) = self.read_export(name).await? {
            if existing.device_path == device_path {
                return Ok(());
            }
        }

        let previous = self.read_fragment_raw(name).await?;
        self.write_fragment(name, device_path, read_only).await?;

        if let Err(e) = self.reload().await {
            warn!("nbd: reload failed after writing {}, rolling back: {}", name, e);
            match previous {
                Some(content) => {
                    fs::write(self.fragment_path(name), content).await?;
                }
                None => {
                    let _ = fs::remove_file(self.fragment_path(name)).await;
                }
            }
            return Err(e);
        }

        // Keep the database row in lockstep with the fragment we just wrote
        // (spec §3 NbdExport invariant: config-file contents == DB row).
        let existing_id = queries::get_export_by_name(&self.pool, name)
            .await
            .ok()
            .flatten()
            .map(|e| e.id);
        let now = Utc::now();
        let row = NbdExport {
            id: existing_id.unwrap_or_else(|| format!("nbdexp-{}", Uuid::new_v4())),
            export_name: name.to_string(),
            device_path: device_path.to_string(),
            port: self.port,
            status: "active".to_string(),
            disk_id: None,
            created_at: now,
            updated_at: now,
        };
        if let Err(e) = queries::upsert_export(&self.pool, &row).await {
            warn!("nbd: failed to persist export row for {}: {}", name, e);
        }

        info!("nbd: export {} -> {}", name, device_path);
        Ok(())
    }

    pub async fn remove_export(&self, name: &str) -> Result<(), NbdError> {
        let path = self.fragment_path(name);
        if fs::metadata(&path).await.is_ok() {
            fs::remove_file(&path).await?;
            self.reload().await?;
            info!("nbd: removed export {}", name);
        }
        if let Err(e) = queries::delete_export_by_name(&self.pool, name).await {
            warn!("nbd: failed to delete export row for {}: {}", name, e);
        }
        Ok(())
    }

    pub async fn list_exports(&self) -> Result<Vec<ExportInfo>, NbdError> {
        let mut exports = vec![ExportInfo {
            name: PLACEHOLDER_EXPORT.to_string(),
            device_path: "/dev/null".to_string(),
            read_only: true,
        }];

        let mut entries = match fs::read_dir(&self.conf_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(exports),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("conf") {
                continue;
            }
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            if let Some(info) = self.parse_fragment(&fs::read_to_string(&path).await?, &name) {
                exports.push(info);
            }
        }
        Ok(exports)
    }

    /// The export refresh invariant (spec §4.3, §8 property 3): if a
    /// fragment for this volume already exists and points at a stale device
    /// path, delete + rewrite + reload.
    pub async fn ensure_device_path_correct(
        &self,
        volume_uuid: &str,
        current_device_path: &str,
    ) -> Result<(), NbdError> {
        let name = Self::export_name_for_volume(volume_uuid);
        match self.read_export(&name).await? {
            Some(existing) if existing.device_path != current_device_path => {
                self.remove_export(&name).await?;
                self.add_export(&name, current_device_path, existing.read_only).await
            }
            Some(_) => Ok(()),
            None => self.add_export(&name, current_device_path, false).await,
        }
    }

    fn fragment_path(&self, name: &str) -> PathBuf {
        self.conf_dir.join(format!("{}.conf", name))
    }

    async fn read_fragment_raw(&self, name: &str) -> Result<Option<String>, NbdError> {
        match fs::read_to_string(self.fragment_path(name)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_export(&self, name: &str) -> Result<Option<ExportInfo>, NbdError> {
        Ok(self
            .read_fragment_raw(name)
            .await?
            .and_then(|content| self.parse_fragment(&content, name)))
    }

    fn parse_fragment(&self, content: &str, name: &str) -> Option<ExportInfo> {
        let mut device_path = None;
        let mut read_only = false;
        for line in content.lines() {
            let line = line.trim();
            if let Some(value) = line.strip_prefix("exportname") {
                device_path = value.trim_start_matches('=').trim().to_string().into();
            } else if let Some(value) = line.strip_prefix("readonly") {
                read_only = value.trim_start_matches('=').trim() == "true";
            }
        }
        device_path.map(|device_path| ExportInfo {
            name: name.to_string(),
            device_path,
            read_only,
        })
    }

    async fn write_fragment(&self, name: &str, device_path: &str, read_only: bool) -> Result<(), NbdError> {
        fs::create_dir_all(&self.conf_dir).await?;
        let content = format!(
            "[{name}]\nexportname = {device}\nreadonly = {ro}\nmultifile = false\ncopyonwrite = false\n",
            name = name,
            device = device_path,
            ro = read_only,
        );
        let tmp_path = self.fragment_path(&format!("{}.tmp", name));
        fs::write(&tmp_path, content)
            .await
            .map_err(|e| NbdError::FragmentWrite(e.to_string()))?;
        fs::rename(&tmp_path, self.fragment_path(name))
            .await
            .map_err(|e| NbdError::FragmentWrite(e.to_string()))
    }

    async fn reload(&self) -> Result<(), NbdError> {
        let pid_text = fs::read_to_string(&self.pid_file)
            .await
            .map_err(|e| NbdError::Reload(format!("reading pid file: {}", e)))?;
        let pid: i32 = pid_text
            .trim()
            .parse()
            .map_err(|e| NbdError::Reload(format!("parsing pid file: {}", e)))?;
        signal::kill(Pid::from_raw(pid), Signal::SIGHUP)
            .map_err(|e| NbdError::Reload(format!("sending SIGHUP: {}", e)))
    }
}
