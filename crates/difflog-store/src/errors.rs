//! Error handling for difflog-store
//!
//! Wraps difflog-core ExError with backend-specific helpers

use difflog_core::errors::{ExError, ExErrorKind};
use rusqlite::ErrorCode;

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

/// Create a migration error
pub fn migration_error(migration_id: &str, reason: &str) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("migration")
        .with_message(format!("Migration {} failed: {}", migration_id, reason))
}

/// Create a checksum mismatch error
pub fn checksum_mismatch(migration_id: &str, expected: &str, actual: &str) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("migration_checksum")
        .with_message(format!(
            "Checksum mismatch for migration {}: expected {}, got {}",
            migration_id, expected, actual
        ))
}

/// Create a database error from rusqlite::Error
///
/// A database that cannot be opened or stays locked is reported as
/// unavailable rather than as a persistence failure.
pub fn from_rusqlite(err: rusqlite::Error) -> ExError {
    let kind = match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(
                e.code,
                ErrorCode::CannotOpen | ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ) =>
        {
            ExErrorKind::StoreUnavailable
        }
        _ => ExErrorKind::Persistence,
    };
    ExError::new(kind).with_op("sqlite").with_message(err.to_string())
}

/// Create a store error from a Redis error
pub fn from_redis(op: &str, key: Option<&str>, err: redis::RedisError) -> ExError {
    let unavailable = err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_io_error()
        || err.is_timeout();
    let ex = ExError::new(redis_error_kind(err.code(), unavailable))
        .with_op(op.to_string())
        .with_message(err.to_string());
    match key {
        Some(key) => ex.with_key(key),
        None => ex,
    }
}

fn redis_error_kind(code: Option<&str>, unavailable: bool) -> ExErrorKind {
    if code == Some("WRONGTYPE") {
        ExErrorKind::KeyTypeMismatch
    } else if unavailable {
        ExErrorKind::StoreUnavailable
    } else {
        ExErrorKind::Persistence
    }
}

/// Create an IO error
pub fn io_error(operation: &str, err: std::io::Error) -> ExError {
    ExError::new(ExErrorKind::Io)
        .with_op(operation.to_string())
        .with_message(err.to_string())
}
