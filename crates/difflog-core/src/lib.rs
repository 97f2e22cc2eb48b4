//! difflog core - per-entity change logs on a sorted time-series store
//!
//! This crate provides:
//! - Diff records and their wire encoding
//! - The `TimeSeriesStore` abstraction and an in-memory implementation
//! - The per-kind `DiffLog` manager (write, read, "all related" reads)
//! - Retention pruning across the log namespace
//! - The change-capture boundary used by host applications
//! - Configuration, the error facility and structured logging

pub mod capture;
pub mod config;
pub mod entity;
pub mod errors;
pub mod index;
pub mod logging_facility;
pub mod manager;
pub mod pruner;
pub mod record;
pub mod store;

pub use difflog_core_types::schema;

// Re-export commonly used types
pub use capture::{ChangeCapture, Registry, SnapshotToken, Tracked};
pub use config::{Backend, DiffsConfig, StoreConfig};
pub use entity::EntityRef;
pub use errors::{ExError, ExErrorKind, Result};
pub use index::{IndexEntry, MemoryIndex, RelationIndex};
pub use manager::{DiffLog, NewDiff};
pub use pruner::{KeyOutcome, PruneInterrupted, PruneReport, Pruner};
pub use record::DiffRecord;
pub use store::{MemoryStore, Order, ScanCursor, ScanPage, ScoredMember, TimeSeriesStore};
