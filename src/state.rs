//! Shared application state.
//!
//! One [`AppState`] is built at startup and shared by every surface (CLI,
//! HTTP, MCP) behind an `Arc`.

use crate::cache::{SchemaRegistry, SchemaStore};
use crate::config::Settings;
use crate::db::{DbPool, PoolConfig, QueryExecutor, SchemaIntrospector};
use crate::error::AppResult;
use crate::generation::{PromptBuilder, ResultPresenter, SqlSynthesizer};
use crate::llm::{LlmClient, OpenAiClient};
use crate::tools::sql_guard::SqlGuard;
use std::sync::Arc;
use tracing::info;

pub struct AppState {
    pub settings: Settings,
    pub pool: DbPool,
    pub schema: Arc<SchemaRegistry>,
    pub prompts: PromptBuilder,
    pub synthesizer: SqlSynthesizer,
    pub presenter: ResultPresenter,
    pub executor: QueryExecutor,
}

impl AppState {
    /// Build state from resolved settings: a lazy pool (the database may be
    /// down at startup) and the OpenAI-compatible client.
    pub fn from_settings(settings: Settings) -> AppResult<Self> {
        let dsn = settings.require_database_url()?;
        let pool = DbPool::connect_lazy(dsn, PoolConfig::from(&settings))?;
        let llm: Arc<dyn LlmClient> = Arc::new(OpenAiClient::new(&settings.llm)?);
        Ok(Self::new(settings, pool, llm))
    }

    /// Build state around an existing pool and model client.
    pub fn new(settings: Settings, pool: DbPool, llm: Arc<dyn LlmClient>) -> Self {
        // require_database_url succeeded for every caller that built `pool`
        let dsn = settings.database_url.clone().unwrap_or_default();
        let store = SchemaStore::new(
            settings.schema_cache_path.clone(),
            &dsn,
            settings.schema_cache_ttl,
        );
        info!(
            dsn_fingerprint = %store.fingerprint(),
            db_type = %pool.db_type(),
            cache = %settings.schema_cache_path.display(),
            "Application state ready"
        );

        let introspector = SchemaIntrospector::new(settings.query_timeout);
        let schema = Arc::new(SchemaRegistry::new(store, introspector, pool.clone()));
        let guard = SqlGuard::new(pool.db_type());

        Self {
            prompts: PromptBuilder::new(settings.system_prompt.clone()),
            synthesizer: SqlSynthesizer::new(llm.clone(), guard, settings.llm.timeout),
            presenter: ResultPresenter::new(llm, settings.llm.timeout),
            executor: QueryExecutor::with_defaults(settings.query_timeout, settings.row_limit),
            schema,
            pool,
            settings,
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
