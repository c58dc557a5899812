//! In-process schema cache.
//!
//! [`SchemaRegistry`] owns the store, the introspector and the pool it reads
//! from. Requests share one snapshot through an `Arc`; introspection on a
//! miss or an explicit refresh is single-flight.

use crate::cache::store::SchemaStore;
use crate::db::{DbPool, SchemaIntrospector};
use crate::error::AppResult;
use crate::models::SchemaSnapshot;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

#[derive(Debug)]
pub struct SchemaRegistry {
    store: SchemaStore,
    introspector: SchemaIntrospector,
    pool: DbPool,
    refresh_lock: Mutex<()>,
}

impl SchemaRegistry {
    pub fn new(store: SchemaStore, introspector: SchemaIntrospector, pool: DbPool) -> Self {
        Self {
            store,
            introspector,
            pool,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Return the cached snapshot, introspecting the database on a miss.
    #[instrument(skip(self), fields(dsn_fingerprint = %self.store.fingerprint()))]
    pub async fn snapshot(&self) -> AppResult<Arc<SchemaSnapshot>> {
        if let Some(snapshot) = self.cached().await {
            return Ok(snapshot);
        }

        let _guard = self.refresh_lock.lock().await;
        // Another request may have filled the cache while we waited
        if let Some(snapshot) = self.cached().await {
            return Ok(snapshot);
        }

        info!("Schema cache miss, introspecting");
        self.introspect_and_save().await
    }

    /// Re-read the schema from the database, replacing the cached copy.
    #[instrument(skip(self), fields(dsn_fingerprint = %self.store.fingerprint()))]
    pub async fn refresh(&self) -> AppResult<Arc<SchemaSnapshot>> {
        let _guard = self.refresh_lock.lock().await;
        self.store.invalidate().await;
        info!("Refreshing schema");
        self.introspect_and_save().await
    }

    /// The cached snapshot without touching the database. Store failures
    /// count as a miss.
    pub async fn cached(&self) -> Option<Arc<SchemaSnapshot>> {
        match self.store.load().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Schema cache unreadable, will introspect");
                None
            }
        }
    }

    async fn introspect_and_save(&self) -> AppResult<Arc<SchemaSnapshot>> {
        let snapshot = self.introspector.introspect(&self.pool).await?;
        match self.store.save(snapshot.clone()).await {
            Ok(saved) => Ok(saved),
            Err(e) => {
                // The request still gets a fresh schema; the next one retries the save
                warn!(error = %e, "Failed to persist schema cache");
                Ok(Arc::new(snapshot))
            }
        }
    }
}
