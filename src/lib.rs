//! NL SQL Server Library
//!
//! Answers natural-language questions about one database: an LLM writes a
//! single read-only SELECT from the cached schema, the statement is
//! validated and executed with a row cap, and the rows come back with a
//! short summary in Spanish.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod generation;
pub mod llm;
pub mod mcp;
pub mod models;
pub mod state;
pub mod tools;
pub mod transport;

pub use config::{Config, Settings};
pub use error::{AppError, AppResult};
pub use mcp::NlSqlService;
pub use state::AppState;
