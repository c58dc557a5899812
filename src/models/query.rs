//! Query-related data models.
//!
//! This module defines the per-request values that flow through the ask
//! pipeline: the generated statement with its guard verdict, the bounded
//! tabular result and the final response.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Default row limit for query results.
pub const DEFAULT_ROW_LIMIT: u32 = 100;

/// Maximum allowed row limit.
pub const MAX_ROW_LIMIT: u32 = 10000;

/// Default query timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Maximum accepted question length, in characters.
pub const MAX_QUESTION_CHARS: usize = 2000;

/// Classification of a candidate statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StatementClass {
    /// SELECT / WITH ... SELECT
    Select,
    /// INSERT, UPDATE, DELETE, MERGE, COPY, SELECT INTO
    DataModifying,
    /// CREATE, ALTER, DROP, TRUNCATE, COMMENT
    SchemaModifying,
    /// GRANT, SET, VACUUM, transaction control, procedure calls, ...
    Administrative,
    /// Empty, multi-statement or not parseable
    Unparseable,
}

impl StatementClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::DataModifying => "data_modifying",
            Self::SchemaModifying => "schema_modifying",
            Self::Administrative => "administrative",
            Self::Unparseable => "unparseable",
        }
    }
}

impl fmt::Display for StatementClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of validating a candidate statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    Valid,
    Rejected {
        class: StatementClass,
        reason: String,
    },
}

impl Verdict {
    pub fn rejected(class: StatementClass, reason: impl Into<String>) -> Self {
        Self::Rejected {
            class,
            reason: reason.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// A statement extracted from an LLM response. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedQuery {
    /// Untouched model output, kept for logging and debugging.
    pub raw_response: String,
    pub sql: String,
    pub verdict: Verdict,
}

/// Rows returned by the executor, bounded by the row limit.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct QueryResult {
    pub columns: Vec<String>,
    /// Positional values, one inner vec per row, aligned with `columns`.
    pub rows: Vec<Vec<JsonValue>>,
    pub row_count: usize,
    pub execution_time_ms: u64,
    /// True when the database had more rows than the limit allowed.
    pub truncated: bool,
}

/// Answer to a natural-language question.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AskResponse {
    pub question: String,
    pub sql: String,
    /// Natural-language summary. Empty when summarization failed.
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_error: Option<String>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<JsonValue>>,
    pub row_count: usize,
    pub execution_time_ms: u64,
    pub truncated: bool,
}

impl AskResponse {
    pub fn new(question: impl Into<String>, sql: impl Into<String>, result: QueryResult) -> Self {
        Self {
            question: question.into(),
            sql: sql.into(),
            summary: String::new(),
            summary_error: None,
            columns: result.columns,
            rows: result.rows,
            row_count: result.row_count,
            execution_time_ms: result.execution_time_ms,
            truncated: result.truncated,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self.summary_error = None;
        self
    }

    pub fn with_summary_error(mut self, error: impl Into<String>) -> Self {
        self.summary = String::new();
        self.summary_error = Some(error.into());
        self
    }
}
