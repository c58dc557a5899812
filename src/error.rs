//! Error types for the NL→SQL server.
//!
//! All failures flow through [`AppError`]. Every variant maps onto one
//! [`ErrorCategory`] so callers can tell a bad question from a bad generated
//! statement, a database problem or an unavailable LLM, and every variant
//! carries an actionable suggestion.

use crate::models::StatementClass;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use schemars::JsonSchema;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Schema cache error: {message} (path: {path})")]
    Storage { message: String, path: String },

    #[error("Schema introspection failed: {message}")]
    Introspection {
        message: String,
        sql_state: Option<String>,
    },

    #[error("LLM request failed: {message}")]
    Llm { message: String },

    #[error("Generated SQL rejected ({class}): {reason}")]
    ValidationRejected {
        class: StatementClass,
        reason: String,
        sql: String,
    },

    #[error("Query execution failed: {message}")]
    Execution {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
    },

    #[error("Invalid question: {message}")]
    InvalidQuestion { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Coarse classification surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    BadQuestion,
    BadGeneratedSql,
    DatabaseProblem,
    LlmUnavailable,
    Configuration,
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadQuestion => "bad_question",
            Self::BadGeneratedSql => "bad_generated_sql",
            Self::DatabaseProblem => "database_problem",
            Self::LlmUnavailable => "llm_unavailable",
            Self::Configuration => "configuration",
            Self::Internal => "internal",
        }
    }
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a schema cache storage error.
    pub fn storage(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            path: path.into(),
        }
    }

    /// Create an introspection error with optional SQL state.
    pub fn introspection(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Introspection {
            message: message.into(),
            sql_state,
        }
    }

    /// Wrap a driver error raised while reading catalog metadata.
    pub fn introspection_failed(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                Self::introspection(db_err.message(), code)
            }
            other => Self::introspection(other.to_string(), None),
        }
    }

    /// Create an LLM error.
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm {
            message: message.into(),
        }
    }

    /// Create a rejection for a generated statement.
    pub fn rejected(
        class: StatementClass,
        reason: impl Into<String>,
        sql: impl Into<String>,
    ) -> Self {
        Self::ValidationRejected {
            class,
            reason: reason.into(),
            sql: sql.into(),
        }
    }

    /// Create an execution error with optional SQL state.
    pub fn execution(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Execution {
            message: message.into(),
            sql_state,
        }
    }

    /// Create a timeout error for a database operation.
    pub fn timeout(operation: &str, elapsed_secs: u64) -> Self {
        Self::execution(format!("{} exceeded {}s", operation, elapsed_secs), None)
    }

    /// Create an invalid question error.
    pub fn invalid_question(message: impl Into<String>) -> Self {
        Self::InvalidQuestion {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Category shown to clients.
    ///
    /// Execution errors reported by the server with a SQLSTATE are caused by
    /// the generated statement; those without one are I/O, pool or timeout
    /// failures.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidQuestion { .. } => ErrorCategory::BadQuestion,
            Self::ValidationRejected { .. } => ErrorCategory::BadGeneratedSql,
            Self::Execution {
                sql_state: Some(_),
                ..
            } => ErrorCategory::BadGeneratedSql,
            Self::Execution { sql_state: None, .. } | Self::Introspection { .. } => {
                ErrorCategory::DatabaseProblem
            }
            Self::Llm { .. } => ErrorCategory::LlmUnavailable,
            Self::Config { .. } => ErrorCategory::Configuration,
            Self::Storage { .. } | Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Get the suggestion for this error.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::Config { .. } => {
                "Check the configuration file, command-line flags and environment variables"
            }
            Self::Storage { .. } => {
                "Check that the schema cache path is writable; the schema will be re-read from the database"
            }
            Self::Introspection { .. } => {
                "Check that the database is reachable and the credentials can read the catalog"
            }
            Self::Llm { .. } => "Check the LLM endpoint, model name and API key, then try again",
            Self::ValidationRejected { .. } => {
                "Only single read-only SELECT queries are executed; rephrase the question as a lookup"
            }
            Self::Execution {
                sql_state: Some(_),
                ..
            } => "Rephrase the question; the generated query did not match the schema",
            Self::Execution { sql_state: None, .. } => {
                "Check database connectivity or ask for a smaller result"
            }
            Self::InvalidQuestion { .. } => "Provide a non-empty question of reasonable length",
            Self::Internal { .. } => "Retry the request; report it if the problem persists",
        }
    }
}

/// Convert sqlx errors raised while executing a query.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                AppError::execution(db_err.message(), code)
            }
            sqlx::Error::PoolTimedOut => AppError::execution("Timed out acquiring a connection", None),
            sqlx::Error::PoolClosed => AppError::execution("Connection pool is closed", None),
            sqlx::Error::Io(io_err) => AppError::execution(format!("I/O error: {}", io_err), None),
            sqlx::Error::Tls(tls_err) => {
                AppError::execution(format!("TLS error: {}", tls_err), None)
            }
            sqlx::Error::Protocol(msg) => {
                AppError::execution(format!("Protocol error: {}", msg), None)
            }
            sqlx::Error::Configuration(msg) => AppError::config(msg.to_string()),
            sqlx::Error::ColumnDecode { index, source } => {
                AppError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => AppError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => AppError::internal("Database worker crashed"),
            other => AppError::internal(format!("Unknown database error: {}", other)),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::llm("request timed out")
        } else if err.is_connect() {
            AppError::llm(format!("could not connect: {}", err))
        } else {
            AppError::llm(err.to_string())
        }
    }
}

/// Result type alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// JSON body returned to HTTP clients on failure.
#[derive(Debug, Serialize, JsonSchema)]
pub struct ErrorBody {
    pub category: ErrorCategory,
    pub message: String,
    pub suggestion: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
}

impl From<&AppError> for ErrorBody {
    fn from(err: &AppError) -> Self {
        let sql = match err {
            AppError::ValidationRejected { sql, .. } => Some(sql.clone()),
            _ => None,
        };
        Self {
            category: err.category(),
            message: err.to_string(),
            suggestion: err.suggestion().to_string(),
            sql,
        }
    }
}

/// Build error data as JSON value.
fn error_data(err: &AppError) -> Option<serde_json::Value> {
    Some(serde_json::json!({
        "category": err.category().as_str(),
        "suggestion": err.suggestion(),
    }))
}

/// Convert AppError to MCP ErrorData for semantic error categorization.
impl From<AppError> for rmcp::ErrorData {
    fn from(err: AppError) -> Self {
        let data = error_data(&err);
        match err.category() {
            ErrorCategory::BadQuestion | ErrorCategory::BadGeneratedSql => {
                let msg = match &err {
                    AppError::Execution {
                        message,
                        sql_state: Some(code),
                    } => format!("{} (SQLSTATE: {})", message, code),
                    _ => err.to_string(),
                };
                rmcp::ErrorData::invalid_params(msg, data)
            }
            ErrorCategory::DatabaseProblem
            | ErrorCategory::LlmUnavailable
            | ErrorCategory::Configuration
            | ErrorCategory::Internal => rmcp::ErrorData::internal_error(err.to_string(), data),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.category() {
            ErrorCategory::BadQuestion => StatusCode::BAD_REQUEST,
            ErrorCategory::BadGeneratedSql => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCategory::DatabaseProblem => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCategory::LlmUnavailable => StatusCode::BAD_GATEWAY,
            ErrorCategory::Configuration | ErrorCategory::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, axum::Json(ErrorBody::from(&self))).into_response()
    }
}
