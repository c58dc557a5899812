//! Data models for the NL→SQL server.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod diagnostics;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use connection::{DatabaseType, masked_connection_string};
pub use diagnostics::{CheckResult, DiagnosticsReport};
pub use query::{
    AskResponse, DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_ROW_LIMIT, GeneratedQuery,
    MAX_QUESTION_CHARS, MAX_ROW_LIMIT, QueryResult, StatementClass, Verdict,
};
pub use schema::{ColumnInfo, ForeignKey, SchemaSnapshot, TableInfo};
