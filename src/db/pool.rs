//! Connection pool management.
//!
//! One process talks to exactly one database. [`DbPool`] wraps the
//! database-specific sqlx pool so each backend keeps its full type support.

use crate::config::Settings;
use crate::error::{AppError, AppResult};
use crate::models::{DatabaseType, masked_connection_string};
use sqlx::{
    PgPool, SqlitePool,
    postgres::{PgConnectOptions, PgPoolOptions},
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::str::FromStr;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

const IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Database-specific connection pool (avoids AnyPool limitations).
#[derive(Debug, Clone)]
pub enum DbPool {
    Postgres(PgPool),
    SQLite(SqlitePool),
}

/// Pool sizing and timeouts.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl From<&Settings> for PoolConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            max_connections: settings.max_connections,
            acquire_timeout: settings.connect_timeout,
        }
    }
}

impl DbPool {
    /// Build a pool without opening a connection. Connections are made on
    /// first use and bounded by the acquire timeout, so a server can start
    /// while its database is down.
    pub fn connect_lazy(dsn: &str, config: PoolConfig) -> AppResult<Self> {
        let db_type = DatabaseType::from_connection_string(dsn).ok_or_else(|| {
            AppError::config(format!(
                "unsupported database URL '{}'",
                masked_connection_string(dsn)
            ))
        })?;

        let pool = match db_type {
            DatabaseType::PostgreSQL => {
                let options = PgConnectOptions::from_str(dsn)
                    .map_err(|e| AppError::config(format!("invalid PostgreSQL URL: {}", e)))?
                    .application_name("nlsql-server");
                DbPool::Postgres(
                    PgPoolOptions::new()
                        .max_connections(config.max_connections)
                        .min_connections(0)
                        .acquire_timeout(config.acquire_timeout)
                        .idle_timeout(IDLE_TIMEOUT)
                        .test_before_acquire(true)
                        .connect_lazy_with(options),
                )
            }
            DatabaseType::SQLite => {
                // Only ever read: the file must exist and is opened read-only.
                let options = SqliteConnectOptions::from_str(dsn)
                    .map_err(|e| AppError::config(format!("invalid SQLite URL: {}", e)))?
                    .read_only(true)
                    .create_if_missing(false);
                DbPool::SQLite(
                    SqlitePoolOptions::new()
                        .max_connections(config.max_connections)
                        .acquire_timeout(config.acquire_timeout)
                        .idle_timeout(IDLE_TIMEOUT)
                        .connect_lazy_with(options),
                )
            }
        };

        debug!(db_type = %db_type, dsn = %masked_connection_string(dsn), "Created lazy pool");
        Ok(pool)
    }

    /// Build a pool and verify it with a round trip.
    pub async fn connect(dsn: &str, config: PoolConfig) -> AppResult<Self> {
        let pool = Self::connect_lazy(dsn, config)?;
        pool.ping(config.acquire_timeout).await?;
        info!(db_type = %pool.db_type(), "Connected to database");
        Ok(pool)
    }

    /// Run `SELECT 1` within `limit`.
    pub async fn ping(&self, limit: Duration) -> AppResult<()> {
        let result = match self {
            DbPool::Postgres(pool) => {
                timeout(limit, sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool)).await
            }
            DbPool::SQLite(pool) => {
                timeout(limit, sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool)).await
            }
        };
        match result {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(AppError::from(e)),
            Err(_) => Err(AppError::timeout("database connection", limit.as_secs())),
        }
    }

    /// Close the connection pool.
    pub async fn close(&self) {
        match self {
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::SQLite(pool) => pool.close().await,
        }
    }

    /// Get the database type for this pool.
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbPool::Postgres(_) => DatabaseType::PostgreSQL,
            DbPool::SQLite(_) => DatabaseType::SQLite,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PoolConfig {
        PoolConfig {
            max_connections: 1,
            acquire_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_connect_lazy_postgres_does_not_connect() {
        let pool = DbPool::connect_lazy("postgres://user:pw@127.0.0.1:1/none", config()).unwrap();
        assert_eq!(pool.db_type(), DatabaseType::PostgreSQL);
    }

    #[test]
    fn test_connect_lazy_rejects_unknown_scheme() {
        let err = DbPool::connect_lazy("mysql://localhost/db", config()).unwrap_err();
        assert!(matches!(err, AppError::Config { .. }));
    }

    #[tokio::test]
    async fn test_ping_unreachable_postgres_fails() {
        let pool = DbPool::connect_lazy("postgres://user:pw@127.0.0.1:1/none", config()).unwrap();
        let err = pool.ping(Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, AppError::Execution { sql_state: None, .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_sqlite_missing_file_fails() {
        let pool =
            DbPool::connect_lazy("sqlite:/nonexistent/dir/none.db", config()).unwrap();
        assert!(pool.ping(Duration::from_secs(2)).await.is_err());
    }
}
