use crate::config::DatabaseConfig;
use anyhow::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, warn};

pub use migrate::*;
pub use operations::*;
pub use pool::*;

pub mod migrate;
pub mod operations;
pub mod pool;

/// Connect the pool, or return `None` when no database URL is configured
pub async fn create_pool(config: &DatabaseConfig) -> Result<Option<PgPool>> {
    let Some(url) = config.url.as_deref() else {
        warn!("DATABASE_URL not set - database features will be disabled");
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
        .connect(url)
        .await?;

    // Test connection
    ping(&pool).await?;
    info!(max_connections = config.max_connections, "Database pool ready");

    Ok(Some(pool))
}
