//! Persisted schema snapshots.
//!
//! The snapshot lives in a pretty-printed JSON file wrapped in an envelope
//! that records which database it describes and when it was written. An
//! in-process map sits in front of the file so repeated loads do not touch
//! the disk.

use crate::error::{AppError, AppResult};
use crate::models::SchemaSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Bumped whenever the envelope or snapshot layout changes.
pub const FORMAT_VERSION: u32 = 1;

/// Stable short identifier for a DSN. Used as cache key and in logs in
/// place of the DSN itself.
pub fn dsn_fingerprint(dsn: &str) -> String {
    format!("{:08x}", crc32fast::hash(dsn.as_bytes()))
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    format_version: u32,
    dsn_fingerprint: String,
    saved_at: DateTime<Utc>,
    snapshot: SchemaSnapshot,
}

#[derive(Debug, Clone)]
struct CachedSnapshot {
    snapshot: Arc<SchemaSnapshot>,
    saved_at: DateTime<Utc>,
}

/// File-backed schema cache for one database.
#[derive(Debug)]
pub struct SchemaStore {
    path: PathBuf,
    fingerprint: String,
    ttl: Option<Duration>,
    memory: RwLock<HashMap<String, CachedSnapshot>>,
}

impl SchemaStore {
    pub fn new(path: impl Into<PathBuf>, dsn: &str, ttl: Option<Duration>) -> Self {
        Self {
            path: path.into(),
            fingerprint: dsn_fingerprint(dsn),
            ttl,
            memory: RwLock::new(HashMap::new()),
        }
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Return the current snapshot, if any.
    ///
    /// A missing file, a file written for another database and an expired
    /// entry are all misses (`Ok(None)`). Unreadable or corrupt files are
    /// errors; callers recover by introspecting again.
    pub async fn load(&self) -> AppResult<Option<Arc<SchemaSnapshot>>> {
        if let Some(entry) = self.memory.read().await.get(&self.fingerprint) {
            if !self.is_expired(entry.saved_at) {
                return Ok(Some(entry.snapshot.clone()));
            }
        }

        let path = self.path.clone();
        let envelope = tokio::task::spawn_blocking(move || read_envelope(&path))
            .await
            .map_err(|e| AppError::internal(format!("schema cache read task failed: {}", e)))??;

        let Some(envelope) = envelope else {
            debug!(path = %self.path.display(), "No schema cache file");
            return Ok(None);
        };

        if envelope.format_version != FORMAT_VERSION {
            info!(
                found = envelope.format_version,
                expected = FORMAT_VERSION,
                "Schema cache format changed, ignoring file"
            );
            return Ok(None);
        }
        if envelope.dsn_fingerprint != self.fingerprint {
            info!(
                dsn_fingerprint = %self.fingerprint,
                file_fingerprint = %envelope.dsn_fingerprint,
                "Schema cache belongs to another database, ignoring file"
            );
            return Ok(None);
        }
        if self.is_expired(envelope.saved_at) {
            info!(saved_at = %envelope.saved_at, "Schema cache expired");
            return Ok(None);
        }

        envelope
            .snapshot
            .validate()
            .map_err(|e| AppError::storage(e, self.path.display().to_string()))?;

        let snapshot = Arc::new(envelope.snapshot);
        self.memory.write().await.insert(
            self.fingerprint.clone(),
            CachedSnapshot {
                snapshot: snapshot.clone(),
                saved_at: envelope.saved_at,
            },
        );
        debug!(tables = snapshot.table_count(), "Loaded schema cache from disk");
        Ok(Some(snapshot))
    }

    /// Persist a snapshot atomically. The in-process entry changes only
    /// once the file is in place.
    pub async fn save(&self, snapshot: SchemaSnapshot) -> AppResult<Arc<SchemaSnapshot>> {
        let envelope = Envelope {
            format_version: FORMAT_VERSION,
            dsn_fingerprint: self.fingerprint.clone(),
            saved_at: Utc::now(),
            snapshot,
        };

        let path = self.path.clone();
        let envelope = tokio::task::spawn_blocking(move || {
            write_envelope(&path, &envelope)?;
            Ok::<_, AppError>(envelope)
        })
        .await
        .map_err(|e| AppError::internal(format!("schema cache write task failed: {}", e)))??;

        let snapshot = Arc::new(envelope.snapshot);
        self.memory.write().await.insert(
            self.fingerprint.clone(),
            CachedSnapshot {
                snapshot: snapshot.clone(),
                saved_at: envelope.saved_at,
            },
        );
        info!(
            path = %self.path.display(),
            tables = snapshot.table_count(),
            "Saved schema cache"
        );
        Ok(snapshot)
    }

    /// Drop the in-process entry. The file is left for the next save to
    /// replace.
    pub async fn invalidate(&self) {
        self.memory.write().await.remove(&self.fingerprint);
    }

    fn is_expired(&self, saved_at: DateTime<Utc>) -> bool {
        let Some(ttl) = self.ttl else {
            return false;
        };
        let age = Utc::now().signed_duration_since(saved_at);
        // A clock that went backwards leaves a negative age: not expired
        age.to_std().map(|age| age > ttl).unwrap_or(false)
    }
}

fn read_envelope(path: &Path) -> AppResult<Option<Envelope>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(AppError::storage(
                format!("failed to read: {}", e),
                path.display().to_string(),
            ));
        }
    };
    serde_json::from_str(&contents).map(Some).map_err(|e| {
        AppError::storage(format!("failed to parse: {}", e), path.display().to_string())
    })
}

fn write_envelope(path: &Path, envelope: &Envelope) -> AppResult<()> {
    let storage_err = |what: &str, e: &dyn std::fmt::Display| {
        AppError::storage(format!("{}: {}", what, e), path.display().to_string())
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| storage_err("failed to create directory", &e))?;
    }

    let json = serde_json::to_string_pretty(envelope)
        .map_err(|e| storage_err("failed to serialize", &e))?;

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    let mut file =
        File::create(&temp_path).map_err(|e| storage_err("failed to create temp file", &e))?;
    file.write_all(json.as_bytes())
        .map_err(|e| storage_err("failed to write", &e))?;
    file.sync_all()
        .map_err(|e| storage_err("failed to sync", &e))?;

    fs::rename(&temp_path, path).map_err(|e| storage_err("failed to rename temp file", &e))?;
    Ok(())
}
