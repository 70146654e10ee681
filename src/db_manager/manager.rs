use crate::db_manager::connection::ConnectionManager;
use crate::db_manager::error::DatabaseError;
use crate::db_manager::migration::MigrationManager;
use sqlx::{MySql, Pool};

/// Owns the connection pool and schema bootstrap for the kernel.
///
/// Every component in the registry is handed `manager.pool()` directly
/// rather than looking it up through `DatabaseManager` at call time —
/// this struct's only job is startup (connect, migrate), not runtime
/// indirection.
pub struct DatabaseManager {
    connection_manager: ConnectionManager,
}

impl DatabaseManager {
    pub async fn new(connection_url: &str) -> Result<Self, DatabaseError> {
        let connection_manager = ConnectionManager::new(connection_url).await?;
        let manager = Self { connection_manager };
        manager.initialize_schema().await?;
        Ok(manager)
    }

    pub async fn initialize_schema(&self) -> Result<(), DatabaseError> {
        MigrationManager::initialize_schema(self.pool()).await
    }

    pub fn pool(&self) -> &Pool<MySql> {
        self.connection_manager.pool()
    }
}
