//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Connection pool management
//! - Read-only query execution
//! - Schema introspection
//! - Type mappings

pub mod executor;
pub mod pool;
pub mod schema;
pub mod types;

pub use executor::QueryExecutor;
pub use pool::{DbPool, PoolConfig};
pub use schema::SchemaIntrospector;
