//! Shared helpers for integration tests: a seeded SQLite database and a
//! scripted language model.

#![allow(dead_code)]

use async_trait::async_trait;
use nlsql_server::config::Settings;
use nlsql_server::db::{DbPool, PoolConfig};
use nlsql_server::error::{AppError, AppResult};
use nlsql_server::llm::{CompletionRequest, LlmClient};
use nlsql_server::state::AppState;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{Connection, Executor, SqliteConnection};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const ORDER_COUNT: i64 = 150;

/// Model client that replays canned answers in order.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    /// `Ok` entries are returned as completions, `Err` entries as LLM errors.
    pub fn new<I, S>(replies: I) -> Arc<Self>
    where
        I: IntoIterator<Item = Result<S, S>>,
        S: Into<String>,
    {
        Arc::new(Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(Into::into).map_err(Into::into))
                    .collect(),
            ),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: &CompletionRequest) -> AppResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(AppError::llm(message)),
            None => Err(AppError::llm("no scripted reply left")),
        }
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// A SQLite file in a temp directory, with a cache path beside it.
pub struct TestDb {
    pub dir: TempDir,
    pub path: PathBuf,
    pub dsn: String,
}

impl TestDb {
    /// Empty database file.
    pub async fn empty() -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shop.db");
        let dsn = format!("sqlite:{}", path.display());
        let db = Self { dir, path, dsn };
        // creates the file
        db.exec("CREATE TABLE _init (x INTEGER)").await;
        db.exec("DROP TABLE _init").await;
        db
    }

    /// `customers` and `orders`, with 3 customers and ORDER_COUNT orders.
    pub async fn shop() -> Self {
        let db = Self::empty().await;
        db.exec(
            "CREATE TABLE customers (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                city TEXT
            )",
        )
        .await;
        db.exec(
            "CREATE TABLE orders (
                id INTEGER PRIMARY KEY,
                customer_id INTEGER NOT NULL REFERENCES customers(id),
                total REAL NOT NULL,
                created_at TEXT
            )",
        )
        .await;
        db.exec(
            "INSERT INTO customers (id, name, city) VALUES
                (1, 'Ana', 'Madrid'),
                (2, 'Luis', 'Sevilla'),
                (3, 'Marta', 'Madrid')",
        )
        .await;

        let mut conn = db.writable().await;
        let mut tx = conn.begin().await.unwrap();
        for i in 1..=ORDER_COUNT {
            sqlx::query("INSERT INTO orders (customer_id, total, created_at) VALUES (?, ?, ?)")
                .bind(i % 3 + 1)
                .bind(i as f64 * 10.0)
                .bind(format!("2024-03-{:02}", i % 28 + 1))
                .execute(&mut *tx)
                .await
                .unwrap();
        }
        tx.commit().await.unwrap();
        conn.close().await.unwrap();
        db
    }

    async fn writable(&self) -> SqliteConnection {
        let options = SqliteConnectOptions::from_str(&self.dsn)
            .unwrap()
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete);
        SqliteConnection::connect_with(&options).await.unwrap()
    }

    /// Run one statement on a separate writable connection.
    pub async fn exec(&self, sql: &str) {
        let mut conn = self.writable().await;
        conn.execute(sql).await.unwrap();
        conn.close().await.unwrap();
    }

    pub async fn table_exists(&self, name: &str) -> bool {
        let mut conn = self.writable().await;
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(name)
                .fetch_one(&mut conn)
                .await
                .unwrap();
        conn.close().await.unwrap();
        count == 1
    }

    pub fn cache_path(&self) -> PathBuf {
        self.dir.path().join("cache").join("schema.json")
    }

    /// Read-only pool, as the server opens it.
    pub fn pool(&self) -> DbPool {
        DbPool::connect_lazy(
            &self.dsn,
            PoolConfig {
                max_connections: 2,
                acquire_timeout: Duration::from_secs(5),
            },
        )
        .unwrap()
    }

    pub fn settings(&self) -> Settings {
        Settings::for_database(&self.dsn)
            .with_schema_cache_path(self.cache_path())
            .with_api_key("test-key")
    }

    pub fn state(&self, llm: Arc<ScriptedLlm>) -> Arc<AppState> {
        self.state_with(self.settings(), llm)
    }

    pub fn state_with(&self, settings: Settings, llm: Arc<ScriptedLlm>) -> Arc<AppState> {
        Arc::new(AppState::new(settings, self.pool(), llm))
    }
}
