mod api;
mod backup;
mod config;
mod cors;
mod db;
mod db_manager;
mod device_monitor;
mod enrollment;
mod error_sanitizer;
mod external_stubs;
mod failover;
mod initialization;
mod job_log;
mod logging;
mod nbd;
mod network;
mod protection_flow;
mod registry;
mod restore;
mod server;
mod snapshot;
mod volume_daemon;

use config::AppConfig;
use external_stubs::{UnimplementedCloudClient, UnimplementedDataMover};
use initialization::{launch_server, setup_database, setup_logging};
use registry::Registry;
use std::sync::Arc;

#[rocket::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_logging().await;

    let config = Arc::new(AppConfig::read().expect("failed to load configuration"));

    let db_manager = setup_database(&config.database_url).await?;

    let cloud = Arc::new(UnimplementedCloudClient);
    let mover = Arc::new(UnimplementedDataMover);
    let registry = Arc::new(
        Registry::build(
            &config,
            &db_manager,
            cloud,
            mover,
            config.sna_tunnel_base_url.clone(),
        )
        .await,
    );
    registry.spawn_background_tasks(&config);

    launch_server(config, db_manager, registry).await?;

    Ok(())
}
