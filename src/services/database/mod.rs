// Data store abstraction for the supported database kinds
pub mod adapter;
pub mod mysql;
pub mod postgresql;

pub use adapter::{DatabaseAdapter, SearchParams};
pub use mysql::MySQLAdapter;
pub use postgresql::PostgreSQLAdapter;

use crate::api::middleware::AppError;
use crate::services::ConnectionPoolManager;
use std::sync::Arc;

/// Database type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseType {
    PostgreSQL,
    MySQL,
}

impl DatabaseType {
    pub fn from_str(s: &str) -> Result<Self, AppError> {
        match s.trim().to_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(DatabaseType::PostgreSQL),
            "mysql" | "mariadb" => Ok(DatabaseType::MySQL),
            _ => Err(AppError::Validation(format!("Unsupported database type: {}", s))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseType::PostgreSQL => "postgresql",
            DatabaseType::MySQL => "mysql",
        }
    }

    /// Delimiter for quoted identifiers in this dialect
    pub fn identifier_quote(&self) -> char {
        match self {
            DatabaseType::PostgreSQL => '"',
            DatabaseType::MySQL => '`',
        }
    }
}

/// Build the adapter for the configured data store.
/// PostgreSQL pools come from the shared pool manager; `timeout_secs` bounds
/// catalog reads and connection tests.
pub async fn create_adapter(
    db_type: DatabaseType,
    connection_url: &str,
    pool_manager: Arc<ConnectionPoolManager>,
    timeout_secs: u64,
) -> Result<Arc<dyn DatabaseAdapter>, AppError> {
    match db_type {
        DatabaseType::PostgreSQL => {
            let pool = pool_manager.get_or_create_pool(connection_url).await?;
            Ok(Arc::new(PostgreSQLAdapter::new(pool, connection_url, timeout_secs)?))
        }
        DatabaseType::MySQL => Ok(Arc::new(MySQLAdapter::new(
            connection_url,
            pool_manager.max_pool_size(),
            timeout_secs,
        )?)),
    }
}
