//! database (db) union structure.
use std::future::Future;
use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::error::{Result, ServerError};

pub const DEFAULT_CREDENTIALS: &str = "postgres";
pub const DEFAULT_DATABASE_NAME: &str = "social";
pub const DEFAULT_POOL_SIZE: u32 = 10;
/// Seconds.
pub const DEFAULT_QUERY_TIMEOUT: u64 = 5;

/// Custom db structure to pass to Axum.
#[derive(Clone)]
pub struct Database {
    pub postgres: PgPool,
    /// Deadline of every single query.
    pub timeout: Duration,
}

impl Database {
    /// Init database connections.
    pub async fn new(
        hostname: &str,
        username: &str,
        password: &str,
        db: &str,
        pool: u32,
        timeout: Duration,
    ) -> std::result::Result<Self, sqlx::Error> {
        let addr = format!("postgres://{username}:{password}@{hostname}/{db}");
        let pool = PgPoolOptions::new()
            .max_connections(pool)
            .acquire_timeout(timeout);
        let postgres = pool.connect(&addr).await?;

        tracing::info!(%hostname, %db, "postgres connected");

        Ok(Self { postgres, timeout })
    }

    /// Wrap an existing pool.
    pub fn from_pool(postgres: PgPool, timeout: Duration) -> Self {
        Self { postgres, timeout }
    }
}

/// Run a query, failing with [`ServerError::Timeout`] once `timeout` elapses.
pub async fn deadline<T, F>(timeout: Duration, query: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(timeout, query).await {
        Ok(result) => Ok(result?),
        Err(_) => {
            tracing::warn!(?timeout, "query deadline exceeded");
            Err(ServerError::Timeout)
        },
    }
}
