//! Schema migrations
//!
//! Embedded SQL applied in order, one transaction each, with a SHA-256
//! checksum recorded per migration so edited migrations are caught.

mod checksums;
mod embedded;
mod runner;

pub use runner::{applied_migrations, apply_migrations};
