//! PostgreSQL persistence layer.
//!
//! Every query is bounded by a short timeout derived from a
//! cancellation-aware context (`tokio::time::timeout`), so a stalled backing
//! store cannot block a request indefinitely. A timeout surfaces as
//! [`AppError::Timeout`], distinct from not-found and conflict outcomes.
//!
//! Versioned rows (movies, users) are updated with a single conditional
//! statement keyed on id *and* version - never a read-then-write pair - so
//! concurrent writers cannot interleave between the compare and the swap.

pub mod filters;
pub mod movies;
pub mod permissions;
pub mod tokens;
pub mod users;

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::config::Config;
use crate::error::{AppError, AppResult};

pub use filters::{Filters, PageMetadata};
pub use movies::MovieStore;
pub use permissions::PermissionStore;
pub use tokens::TokenStore;
pub use users::UserStore;

/// Upper bound for a single query.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound for token writes, which sit on the registration hot path.
pub const TOKEN_QUERY_TIMEOUT: Duration = Duration::from_secs(3);

/// All stores over one shared connection pool.
#[derive(Clone)]
pub struct Storage {
    pub movies: MovieStore,
    pub users: UserStore,
    pub tokens: TokenStore,
    pub permissions: PermissionStore,
    pool: PgPool,
}

impl Storage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            movies: MovieStore::new(pool.clone()),
            users: UserStore::new(pool.clone()),
            tokens: TokenStore::new(pool.clone()),
            permissions: PermissionStore::new(pool.clone()),
            pool,
        }
    }

    /// Connection pool statistics for runtime introspection.
    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            connections: self.pool.size(),
            idle_connections: self.pool.num_idle(),
        }
    }
}

/// Snapshot of the connection pool, exposed by `/debug/vars`.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub connections: u32,
    pub idle_connections: usize,
}

/// Open the connection pool and verify connectivity with a bounded ping.
pub async fn connect(config: &Config) -> AppResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .idle_timeout(config.db_idle_timeout)
        .connect_lazy(&config.db_dsn)
        .map_err(AppError::Database)?;

    with_timeout(QUERY_TIMEOUT, "database ping", async {
        sqlx::query("SELECT 1").execute(&pool).await
    })
    .await?;

    info!("database connection pool established");
    Ok(pool)
}

/// Run a query future under `limit`, mapping elapsed time to
/// [`AppError::Timeout`] and query failures to [`AppError::Database`].
pub(crate) async fn with_timeout<T, F>(
    limit: Duration,
    context: &'static str,
    fut: F,
) -> AppResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(AppError::Database(e)),
        Err(_) => Err(AppError::Timeout(context.to_string())),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_passes_values_through() {
        let result = with_timeout(Duration::from_secs(1), "noop", async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_maps_elapsed_to_timeout_error() {
        let result: AppResult<()> = with_timeout(Duration::from_secs(5), "slow query", async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(AppError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_with_timeout_preserves_query_errors() {
        let result: AppResult<()> = with_timeout(Duration::from_secs(1), "broken", async {
            Err(sqlx::Error::RowNotFound)
        })
        .await;

        assert!(matches!(
            result,
            Err(AppError::Database(sqlx::Error::RowNotFound))
        ));
    }
}
