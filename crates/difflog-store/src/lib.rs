//! difflog store - durable backends for the diff log
//!
//! Provides:
//! - SQLite sorted-set store and relation index with a migrations framework
//! - Redis sorted-set store
//! - Backend selection from `DiffsConfig`

pub mod backend;
pub mod db;
pub mod errors;
pub mod migrations;
pub mod redis_store;
pub mod sqlite_index;
pub mod sqlite_store;

// Re-export key types
pub use backend::{open_from_config, Backends};
pub use db::Database;
pub use errors::Result;
pub use redis_store::RedisStore;
pub use sqlite_index::SqliteIndex;
pub use sqlite_store::SqliteStore;
