//! Schema tools: read the cached snapshot or force a refresh.

use crate::error::AppResult;
use crate::models::SchemaSnapshot;
use crate::state::AppState;
use std::sync::Arc;

/// Handler for schema operations.
pub struct SchemaToolHandler {
    state: Arc<AppState>,
}

impl SchemaToolHandler {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// The cached snapshot, introspecting on a miss.
    pub async fn get_schema(&self) -> AppResult<SchemaSnapshot> {
        let snapshot = self.state.schema.snapshot().await?;
        Ok(SchemaSnapshot::clone(&snapshot))
    }

    /// Re-read the schema from the database and replace the cache.
    pub async fn refresh_schema(&self) -> AppResult<SchemaSnapshot> {
        let snapshot = self.state.schema.refresh().await?;
        Ok(SchemaSnapshot::clone(&snapshot))
    }
}
