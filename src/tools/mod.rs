//! Tool implementations shared by the CLI, HTTP and MCP surfaces.
//!
//! - `ask`: answer a natural-language question
//! - `schema`: read or refresh the schema snapshot
//! - `diagnostics`: configuration, database and schema cache health
//! - `sql_guard`: read-only enforcement for generated SQL
//! - `format`: table and markdown rendering

pub mod ask;
pub mod diagnostics;
pub mod format;
pub mod schema;
pub mod sql_guard;

pub use ask::{AskInput, AskOutput, AskToolHandler};
pub use diagnostics::DiagnosticsProbe;
pub use format::OutputFormat;
pub use schema::SchemaToolHandler;
pub use sql_guard::SqlGuard;
