use deadpool_postgres::{Config as PoolConfig, ManagerConfig, Pool, RecyclingMethod};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_postgres::NoTls;

use crate::api::middleware::AppError;

/// Keeps one PostgreSQL pool per data store URL.
///
/// Connections are checked out per call by the adapters and go back to the
/// pool when dropped; nothing holds a connection across turns.
pub struct ConnectionPoolManager {
    pools: Arc<RwLock<HashMap<String, Pool>>>,
    max_pool_size: usize,
}

impl ConnectionPoolManager {
    pub fn new(max_pool_size: usize) -> Self {
        Self {
            pools: Arc::new(RwLock::new(HashMap::new())),
            max_pool_size: max_pool_size.max(1),
        }
    }

    pub fn max_pool_size(&self) -> usize {
        self.max_pool_size
    }

    /// Get or create the pool for the given connection URL.
    /// Safe to call concurrently from multiple tasks.
    pub async fn get_or_create_pool(&self, connection_url: &str) -> Result<Pool, AppError> {
        // Fast path: check if pool already exists (read lock)
        {
            let pools = self.pools.read().await;
            if let Some(pool) = pools.get(connection_url) {
                return Ok(pool.clone());
            }
        }

        let mut pools = self.pools.write().await;

        // Double-check in case another task created the pool while we were waiting
        if let Some(pool) = pools.get(connection_url) {
            return Ok(pool.clone());
        }

        tracing::info!(
            "Creating connection pool for: {} (max_size: {})",
            mask_credentials(connection_url),
            self.max_pool_size
        );

        let mut cfg = PoolConfig::new();
        cfg.url = Some(connection_url.to_string());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = cfg
            .create_pool(Some(deadpool_postgres::Runtime::Tokio1), NoTls)
            .map_err(|e| {
                tracing::error!("Failed to create connection pool: {}", e);
                AppError::Connection(format!("Failed to create connection pool: {}", e))
            })?;
        pool.resize(self.max_pool_size);

        pools.insert(connection_url.to_string(), pool.clone());
        Ok(pool)
    }

    pub async fn pool_count(&self) -> usize {
        self.pools.read().await.len()
    }

    /// Status of the pool for a URL, if one was created
    pub async fn pool_status(&self, connection_url: &str) -> Option<PoolStatus> {
        let pools = self.pools.read().await;
        pools.get(connection_url).map(|pool| {
            let status = pool.status();
            PoolStatus {
                size: status.size,
                available: status.available,
                max_size: status.max_size,
            }
        })
    }
}

/// Pool occupancy reported by the health endpoint
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub size: usize,
    pub available: usize,
    pub max_size: usize,
}

/// Mask credentials in a connection URL for safe logging
pub fn mask_credentials(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed_url) => {
            let mut masked = parsed_url.clone();
            if parsed_url.password().is_some() {
                let _ = masked.set_password(Some("***"));
            }
            masked.to_string()
        }
        Err(_) => "[invalid-url]".to_string(),
    }
}
