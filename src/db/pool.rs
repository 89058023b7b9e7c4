use sqlx::postgres::PgPool;
use std::time::Duration;
use tracing::{info, warn};

pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Close the pool, waiting at most `timeout` for checked-out connections
pub async fn close_pool(pool: &PgPool, timeout: Duration) {
    info!("Closing database connection pool...");
    if tokio::time::timeout(timeout, pool.close()).await.is_err() {
        warn!("Timed out closing database pool");
        return;
    }
    info!("Database connection pool closed");
}
