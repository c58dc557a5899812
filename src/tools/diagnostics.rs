//! Health probe for configuration, database and schema cache.

use crate::config::Settings;
use crate::models::{CheckResult, DiagnosticsReport};
use crate::state::AppState;
use std::sync::Arc;
use tracing::{info, warn};

/// Runs the three diagnostics checks. Never fails: every problem lands in
/// the report.
pub struct DiagnosticsProbe {
    settings: Settings,
    state: Result<Arc<AppState>, String>,
}

impl DiagnosticsProbe {
    /// Probe an already running application.
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            settings: state.settings.clone(),
            state: Ok(state),
        }
    }

    /// Probe from settings alone. State that cannot be built is reported
    /// by the checks that need it.
    pub fn from_settings(settings: Settings) -> Self {
        let state = AppState::from_settings(settings.clone())
            .map(Arc::new)
            .map_err(|e| e.to_string());
        Self { settings, state }
    }

    pub async fn run(&self) -> DiagnosticsReport {
        let config_loaded = CheckResult::from(self.settings.validate());

        let (db_reachable, schema_cache_ready) = match &self.state {
            Err(e) => (
                CheckResult::failed(e.clone()),
                CheckResult::failed(format!("database unavailable: {}", e)),
            ),
            Ok(state) => {
                let db_reachable = CheckResult::from(
                    state.pool.ping(self.settings.connect_timeout).await,
                );
                let schema_cache_ready = if db_reachable.ok {
                    CheckResult::from(state.schema.snapshot().await.map(|_| ()))
                } else {
                    match state.schema.cached().await {
                        Some(_) => CheckResult::passed(),
                        None => CheckResult::failed(format!(
                            "no cached schema and database unavailable: {}",
                            db_reachable.error.as_deref().unwrap_or("unknown error")
                        )),
                    }
                };
                (db_reachable, schema_cache_ready)
            }
        };

        let report = DiagnosticsReport {
            config_loaded,
            db_reachable,
            schema_cache_ready,
        };
        if report.healthy() {
            info!("Diagnostics passed");
        } else {
            warn!(
                config_loaded = report.config_loaded.ok,
                db_reachable = report.db_reachable.ok,
                schema_cache_ready = report.schema_cache_ready.ok,
                "Diagnostics found problems"
            );
        }
        report
    }
}
