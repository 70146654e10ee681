// Component registry: constructs every piece of the kernel once at startup
// and hands out `Arc` handles. Nothing in this process looks components up
// by name at call time — everything is wired here and passed down through
// constructors (spec §9, "no global mutable singleton").

use crate::backup::{BackupEngine, DataMover};
use crate::config::AppConfig;
use crate::db_manager::DatabaseManager;
use crate::device_monitor::DeviceMonitor;
use crate::enrollment::EnrollmentRegistry;
use crate::error_sanitizer;
use crate::failover::FailoverEngine;
use crate::job_log::JobLog;
use crate::nbd::NbdExportManager;
use crate::network::cloud_client::CloudApiClient;
use crate::network::sna_client::SnaClient;
use crate::protection_flow::ProtectionFlowEngine;
use crate::restore::RestoreEngine;
use crate::snapshot::SnapshotService;
use crate::volume_daemon::VolumeDaemon;
use sqlx::{MySql, Pool};
use std::sync::Arc;
use std::time::Duration;

/// Every long-lived component the kernel hands around, built once in
/// `Registry::build` and shared from there. `error_sanitizer` has no state
/// (spec §4.11 is a pure function module) so it isn't a field here.
pub struct Registry {
    pub pool: Pool<MySql>,
    pub job_log: Arc<JobLog>,
    pub device_monitor: Arc<DeviceMonitor>,
    pub nbd: Arc<NbdExportManager>,
    pub volume_daemon: Arc<VolumeDaemon>,
    pub snapshot: Arc<SnapshotService>,
    pub backup_engine: Arc<BackupEngine>,
    pub restore_engine: Arc<RestoreEngine>,
    pub failover_engine: Arc<FailoverEngine>,
    pub protection_flow_engine: Arc<ProtectionFlowEngine>,
    pub enrollment_registry: Arc<EnrollmentRegistry>,
    pub sna: Arc<SnaClient>,
    pub cloud: Arc<dyn CloudApiClient>,
    pub mover: Arc<dyn DataMover>,
}

impl Registry {
    pub async fn build(
        config: &AppConfig,
        db_manager: &DatabaseManager,
        cloud: Arc<dyn CloudApiClient>,
        mover: Arc<dyn DataMover>,
        tunnel_base_url: String,
    ) -> Self {
        let pool = db_manager.pool().clone();

        let job_log = Arc::new(JobLog::new(pool.clone()));
        let nbd = Arc::new(NbdExportManager::new(
            pool.clone(),
            config.nbd_port,
            config.nbd_conf_dir.clone(),
            config.nbd_pid_file.clone(),
        ));
        let device_monitor = Arc::new(DeviceMonitor::new());
        let sna = Arc::new(SnaClient::new(tunnel_base_url));

        let volume_daemon = Arc::new(VolumeDaemon::new(
            pool.clone(),
            cloud.clone(),
            device_monitor.clone(),
            nbd.clone(),
            config.hub_vm_id.clone(),
        ));

        let snapshot = Arc::new(SnapshotService::new(pool.clone(), cloud.clone()));

        let backup_engine = Arc::new(BackupEngine::new(
            pool.clone(),
            config.backup_repository_root.clone(),
            4,
        ));

        let restore_engine = Arc::new(RestoreEngine::new(
            pool.clone(),
            nbd.clone(),
            "127.0.0.1".to_string(),
            config.nbd_port,
            config.restore_mount_root.clone(),
            config.restore_idle_expiry_seconds,
        ));

        let failover_engine = Arc::new(FailoverEngine::new(
            pool.clone(),
            job_log.clone(),
            cloud.clone(),
            sna.clone(),
            volume_daemon.clone(),
            snapshot.clone(),
            Duration::from_secs(config.failover_power_off_timeout_seconds),
            Duration::from_secs(config.failover_volume_attach_timeout_seconds),
        ));

        let protection_flow_engine = Arc::new(ProtectionFlowEngine::new(
            pool.clone(),
            backup_engine.clone(),
            mover.clone(),
            sna.clone(),
        ));

        let enrollment_registry = Arc::new(EnrollmentRegistry::new(pool.clone()));

        Self {
            pool,
            job_log,
            device_monitor,
            nbd,
            volume_daemon,
            snapshot,
            backup_engine,
            restore_engine,
            failover_engine,
            protection_flow_engine,
            enrollment_registry,
            sna,
            cloud,
            mover,
        }
    }

    /// Background loops the process root spawns once at startup.
    pub fn spawn_background_tasks(&self, config: &AppConfig) {
        let restore_engine = self.restore_engine.clone();
        tokio::spawn(async move { restore_engine.run_sweeper_loop().await });

        let protection_flow_engine = self.protection_flow_engine.clone();
        tokio::spawn(async move { protection_flow_engine.run_ticker_loop().await });

        let job_log = self.job_log.clone();
        let retention_days = config.job_log_retention_days;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(3600));
            loop {
                ticker.tick().await;
                match job_log.prune_older_than(retention_days).await {
                    Ok(0) => {}
                    Ok(n) => log::info!("job log: pruned {} job(s) past retention", n),
                    Err(e) => log::error!("job log: prune sweep failed: {}", e),
                }
            }
        });
    }
}

pub use error_sanitizer::sanitize;
