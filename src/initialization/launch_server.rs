use crate::config::AppConfig;
use crate::db_manager::DatabaseManager;
use crate::registry::Registry;
use crate::server::{build_rocket, build_volume_daemon_rocket};
use colored::Colorize;
use std::sync::Arc;

/// Builds and launches both Rocket surfaces: the main `/api/v1` API and the
/// Volume Daemon's loopback-only HTTP surface (spec §6).
pub async fn launch_server(
    config: Arc<AppConfig>,
    db_manager: Arc<DatabaseManager>,
    registry: Arc<Registry>,
) -> Result<(), Box<dyn std::error::Error>> {
    let volume_daemon_rocket = build_volume_daemon_rocket(&config, registry.clone());
    tokio::spawn(async move {
        if let Err(e) = volume_daemon_rocket.launch().await {
            log::error!("volume daemon HTTP surface exited: {}", e);
        }
    });

    let rocket_with_routes = build_rocket(config, db_manager, registry);
    log::info!("{}", "LAUNCHING SERVER...".bright_cyan().bold());
    rocket_with_routes.launch().await?;
    Ok(())
}
