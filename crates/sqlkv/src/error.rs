//! Error types for the key-value store

use rusqlite::ErrorCode;
use thiserror::Error;

use crate::key::Key;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, KvError>;

/// Errors that can occur during key-value store operations
#[derive(Debug, Error)]
pub enum KvError {
    /// No entry exists for the key
    #[error("key not found: {0}")]
    NotFound(Key),

    /// The store was closed and can no longer be used
    #[error("operation on closed store")]
    Closed,

    /// Close was refused because the transaction lock is still held
    #[error("store is locked (depth {depth})")]
    Locked { depth: usize },

    /// Release called without a matching acquire
    #[error("release without a matching acquire")]
    NotLocked,

    /// Key has no SQLite representation of its own
    #[error("invalid key: {0}")]
    InvalidKey(Key),

    /// Table name cannot be used as an SQL identifier
    #[error("invalid table name: {0:?}")]
    InvalidTable(String),

    /// Unknown close-while-locked policy name
    #[error("invalid close policy {0:?}, expected one of: raise, abandon, flush")]
    InvalidPolicy(String),

    /// Database connection or query error, including lock timeouts
    #[error("SQLite error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl KvError {
    /// True when the engine refused the operation because another
    /// connection holds the database lock.
    pub fn is_busy(&self) -> bool {
        match self {
            KvError::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// True for [`KvError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, KvError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_detection() {
        let busy = KvError::Database(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        ));
        assert!(busy.is_busy());
        assert!(!KvError::Closed.is_busy());
        assert!(!KvError::Database(rusqlite::Error::QueryReturnedNoRows).is_busy());
    }

    #[test]
    fn test_not_found_message_shows_key_type() {
        let err = KvError::NotFound(Key::from("13"));
        assert_eq!(err.to_string(), r#"key not found: "13""#);
        let err = KvError::NotFound(Key::from(13));
        assert_eq!(err.to_string(), "key not found: 13");
        assert!(err.is_not_found());
    }
}
