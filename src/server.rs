use colored::Colorize;
use rocket::{get, routes, Build, Rocket};
use std::sync::Arc;

use crate::api;
use crate::config::AppConfig;
use crate::cors::{cors_preflight, CORS};
use crate::db_manager::DatabaseManager;
use crate::registry::Registry;

#[get("/health")]
fn health_check() -> rocket::serde::json::Value {
    rocket::serde::json::json!({"status": "ok"})
}

/// Builds the main `/api/v1` Rocket instance (spec §6). The Volume Daemon's
/// loopback HTTP surface is a separate instance built by
/// `build_volume_daemon_rocket`, not mounted here.
pub fn build_rocket(
    config: Arc<AppConfig>,
    db_manager: Arc<DatabaseManager>,
    registry: Arc<Registry>,
) -> Rocket<Build> {
    println!(
        "{}",
        "╔═══════════════════════════════════════════════════════════════╗".bright_cyan()
    );
    println!(
        "{}",
        "║                       SERVER STARTUP                          ║".bright_cyan()
    );
    println!(
        "{}",
        "╚═══════════════════════════════════════════════════════════════╝".bright_cyan()
    );

    log::info!("{}", "Defining API routes".cyan());
    let port = config.http_port;

    log::info!("{}", "Building Rocket instance".cyan());
    let rocket_with_routes = rocket::build()
        .configure(rocket::Config {
            port,
            address: std::net::IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0)),
            ..Default::default()
        })
        .manage(config)
        .manage(db_manager)
        .manage(registry.pool.clone())
        .manage(registry.job_log.clone())
        .manage(registry.device_monitor.clone())
        .manage(registry.nbd.clone())
        .manage(registry.volume_daemon.clone())
        .manage(registry.snapshot.clone())
        .manage(registry.backup_engine.clone())
        .manage(registry.restore_engine.clone())
        .manage(registry.failover_engine.clone())
        .manage(registry.protection_flow_engine.clone())
        .manage(registry.enrollment_registry.clone())
        .manage(registry.sna.clone())
        .manage(registry.cloud.clone())
        .manage(registry.mover.clone())
        .attach(CORS)
        .mount("/", routes![health_check, cors_preflight])
        .mount("/api/v1", api::routes())
        .mount("/api/v1/public", api::public_routes());

    rocket_with_routes
}

/// The Volume Daemon's own loopback-only HTTP surface (spec §6), bound to a
/// separate port so it is never reachable from outside the hub appliance.
pub fn build_volume_daemon_rocket(config: &AppConfig, registry: Arc<Registry>) -> Rocket<Build> {
    rocket::build()
        .configure(rocket::Config {
            port: config.volume_daemon_port,
            address: std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
            ..Default::default()
        })
        .manage(registry.volume_daemon.clone())
        .mount("/", crate::volume_daemon::http::routes())
}
