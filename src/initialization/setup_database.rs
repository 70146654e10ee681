use crate::db_manager::DatabaseManager;
use anyhow::Result;
use colored::Colorize;
use std::sync::Arc;

/// Connects to the configured database and applies the schema migration.
pub async fn setup_database(database_url: &str) -> Result<Arc<DatabaseManager>> {
    log::info!("{}", format!("Database URL: {}", database_url).blue());
    let db_manager = Arc::new(DatabaseManager::new(database_url).await?);
    Ok(db_manager)
}
