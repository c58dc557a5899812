//! Query execution engine.
//!
//! Runs a validated statement and returns at most `limit` rows:
//! - Row limits are enforced while streaming, so only `limit + 1` rows are
//!   ever pulled from the server
//! - Every query is bounded by a timeout
//! - PostgreSQL queries run inside a `READ ONLY` transaction that is always
//!   rolled back, with a server-side `statement_timeout` as a second bound
//! - SQLite pools are opened read-only
//!
//! The executor does not re-validate. Callers pass only statements the guard
//! accepted.

use crate::db::pool::DbPool;
use crate::db::types::RowToJson;
use crate::error::{AppError, AppResult};
use crate::models::{DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_ROW_LIMIT, MAX_ROW_LIMIT, QueryResult};
use futures_util::StreamExt;
use sqlx::Column;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Query executor that handles database query execution.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    default_timeout: Duration,
    default_limit: u32,
}

impl QueryExecutor {
    /// Create a new query executor with default settings.
    pub fn new() -> Self {
        Self {
            default_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
            default_limit: DEFAULT_ROW_LIMIT,
        }
    }

    /// Create a new query executor with custom settings.
    pub fn with_defaults(query_timeout: Duration, row_limit: u32) -> Self {
        Self {
            default_timeout: query_timeout,
            default_limit: row_limit.clamp(1, MAX_ROW_LIMIT),
        }
    }

    pub fn row_limit(&self) -> u32 {
        self.default_limit
    }

    /// Execute a read-only query with the configured limit and timeout.
    pub async fn execute(&self, pool: &DbPool, sql: &str) -> AppResult<QueryResult> {
        self.execute_with(pool, sql, self.default_limit, self.default_timeout)
            .await
    }

    /// Execute with an explicit limit and timeout.
    pub async fn execute_with(
        &self,
        pool: &DbPool,
        sql: &str,
        limit: u32,
        query_timeout: Duration,
    ) -> AppResult<QueryResult> {
        let start = Instant::now();
        // Clamp so limit=0 cannot mark every result as truncated
        let row_limit = limit.clamp(1, MAX_ROW_LIMIT);

        debug!(
            sql = %sql,
            limit = row_limit,
            timeout_secs = query_timeout.as_secs(),
            "Executing query"
        );

        match pool {
            DbPool::Postgres(p) => {
                let fetched = postgres::fetch_rows(p, sql, row_limit, query_timeout).await?;
                process_rows(fetched, row_limit, start)
            }
            DbPool::SQLite(p) => {
                let fetched = sqlite::fetch_rows(p, sql, row_limit, query_timeout).await?;
                process_rows(fetched, row_limit, start)
            }
        }
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Rows pulled from the server plus the column names, which are looked up
/// separately when no row came back.
struct Fetched<R> {
    rows: Vec<R>,
    columns: Option<Vec<String>>,
}

/// Process rows from any database type into a QueryResult.
fn process_rows<R: RowToJson>(
    fetched: Fetched<R>,
    row_limit: u32,
    start: Instant,
) -> AppResult<QueryResult> {
    let execution_time_ms = start.elapsed().as_millis() as u64;
    let Fetched { rows, columns } = fetched;

    let columns = match rows.first() {
        Some(row) => row.column_names(),
        None => columns.unwrap_or_default(),
    };

    let total_rows = rows.len();
    let truncated = total_rows > row_limit as usize;

    let values: Vec<Vec<serde_json::Value>> = rows
        .iter()
        .take(row_limit as usize)
        .map(|r| r.to_json_values())
        .collect();

    if truncated {
        warn!(limit = row_limit, "Query result truncated");
    }

    Ok(QueryResult {
        columns,
        row_count: values.len(),
        rows: values,
        execution_time_ms,
        truncated,
    })
}

// =============================================================================
// Common Helper Functions
// =============================================================================

fn collect_rows<R>(results: Vec<Result<R, sqlx::Error>>) -> AppResult<Vec<R>> {
    let mut rows = Vec::with_capacity(results.len());
    for result in results {
        rows.push(result.map_err(AppError::from)?);
    }
    Ok(rows)
}

fn timeout_error(operation: &str, timeout: Duration) -> AppError {
    AppError::timeout(operation, timeout.as_secs())
}

fn column_names<C: Column>(columns: &[C]) -> Vec<String> {
    columns.iter().map(|c| c.name().to_string()).collect()
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

mod postgres {
    use super::*;
    use sqlx::postgres::PgRow;
    use sqlx::{Executor, PgPool};

    pub async fn fetch_rows(
        pool: &PgPool,
        sql: &str,
        row_limit: u32,
        query_timeout: Duration,
    ) -> AppResult<Fetched<PgRow>> {
        let fetch_limit = row_limit as usize + 1;
        let mut tx = pool.begin().await?;

        // Raw strings go over the simple protocol; SET cannot be prepared
        // with a bound parameter.
        (&mut *tx).execute("SET TRANSACTION READ ONLY").await?;
        let statement_timeout = format!(
            "SET LOCAL statement_timeout = {}",
            query_timeout.as_millis()
        );
        (&mut *tx).execute(statement_timeout.as_str()).await?;

        let results = timeout(
            query_timeout,
            (&mut *tx).fetch(sql).take(fetch_limit).collect::<Vec<_>>(),
        )
        .await;

        let rows = match results {
            Ok(results) => collect_rows(results),
            Err(_) => Err(timeout_error("query execution", query_timeout)),
        };

        let columns = match &rows {
            Ok(rows) if rows.is_empty() => (&mut *tx)
                .describe(sql)
                .await
                .ok()
                .map(|d| column_names(d.columns())),
            _ => None,
        };

        // Nothing in this transaction may persist.
        if let Err(e) = tx.rollback().await {
            debug!(error = %e, "Rollback after read-only query failed");
        }

        Ok(Fetched {
            rows: rows?,
            columns,
        })
    }
}

mod sqlite {
    use super::*;
    use sqlx::sqlite::SqliteRow;
    use sqlx::{Executor, SqlitePool};

    pub async fn fetch_rows(
        pool: &SqlitePool,
        sql: &str,
        row_limit: u32,
        query_timeout: Duration,
    ) -> AppResult<Fetched<SqliteRow>> {
        let fetch_limit = row_limit as usize + 1;
        let rows_future = pool.fetch(sql).take(fetch_limit).collect::<Vec<_>>();

        let rows = match timeout(query_timeout, rows_future).await {
            Ok(results) => collect_rows(results)?,
            Err(_) => return Err(timeout_error("query execution", query_timeout)),
        };

        let columns = if rows.is_empty() {
            pool.describe(sql)
                .await
                .ok()
                .map(|d| column_names(d.columns()))
        } else {
            None
        };

        Ok(Fetched { rows, columns })
    }
}
