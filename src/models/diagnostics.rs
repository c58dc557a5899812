//! Diagnostics report model.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Result of one named check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CheckResult {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    pub fn passed() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}

impl<E: std::fmt::Display> From<Result<(), E>> for CheckResult {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self::passed(),
            Err(e) => Self::failed(e.to_string()),
        }
    }
}

/// Health of the configuration, the database and the schema cache.
/// Built fresh on every probe.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DiagnosticsReport {
    pub config_loaded: CheckResult,
    pub db_reachable: CheckResult,
    pub schema_cache_ready: CheckResult,
}

impl DiagnosticsReport {
    pub fn healthy(&self) -> bool {
        self.config_loaded.ok && self.db_reachable.ok && self.schema_cache_ready.ok
    }
}
