//! Schema snapshot caching: a file-backed store and the registry that fills
//! it from the database.

pub mod registry;
pub mod store;

pub use registry::SchemaRegistry;
pub use store::{SchemaStore, dsn_fingerprint};
