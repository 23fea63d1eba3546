//! Error types for the sync engine
//!
//! Fatal errors abort a run and surface as [`SyncError`]. Per-item storage
//! failures surface as [`StoreError`] and never abort a run; their
//! [`FailureKind`] decides whether they are recorded for retry.

use std::path::PathBuf;

/// Errors that abort a sync run
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The remote side failed to deliver a batch (network, auth, schema)
    #[error("failed to fetch batch: {0:#}")]
    Fetch(#[source] anyhow::Error),

    /// Checkpoint or failed-record file could not be read or written
    #[error("{action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Checkpoint or failed-record file exists but is not valid JSON
    #[error("{action} {}: {source}", path.display())]
    Json {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The run was configured incorrectly
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

/// How a storage failure should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The store was locked or contended; retrying later is expected to work
    Transient,
    /// Any other failure (constraint violation, bad data); logged and skipped
    Permanent,
}

/// A failed attempt to store a single item
#[derive(Debug, Clone, thiserror::Error)]
#[error("{operation}: {message}")]
pub struct StoreError {
    /// The storage operation that failed (e.g. "upsert document")
    pub operation: String,
    /// Error message reported by the store
    pub message: String,
    /// Classification of the failure
    pub kind: FailureKind,
}

impl StoreError {
    /// Create a store error, classifying it by its message
    pub fn new(operation: impl Into<String>, error: impl std::fmt::Display) -> Self {
        let message = error.to_string();
        let kind = if is_lock_error(&message) {
            FailureKind::Transient
        } else {
            FailureKind::Permanent
        };
        Self {
            operation: operation.into(),
            message,
            kind,
        }
    }

    /// Create a store error that is known to be transient
    pub fn transient(operation: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            operation: operation.into(),
            message: error.to_string(),
            kind: FailureKind::Transient,
        }
    }

    /// Create a store error that is known to be permanent
    pub fn permanent(operation: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            operation: operation.into(),
            message: error.to_string(),
            kind: FailureKind::Permanent,
        }
    }

    /// Classify a SQLite error, using the result code before the message
    pub fn from_sqlite(operation: impl Into<String>, error: &rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match error.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
                Self::transient(operation, error)
            }
            _ => Self::new(operation, error),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == FailureKind::Transient
    }
}

/// Check whether an error message indicates that the database was locked
pub fn is_lock_error(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked") || message.contains("database locked")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_lock_error() {
        assert!(is_lock_error("database is locked"));
        assert!(is_lock_error("Error: DATABASE LOCKED (code 5)"));
        assert!(!is_lock_error("UNIQUE constraint failed: documents.id"));
        assert!(!is_lock_error(""));
    }

    #[test]
    fn test_store_error_classification() {
        let locked = StoreError::new("upsert document", "database is locked");
        assert!(locked.is_transient());
        assert_eq!(locked.to_string(), "upsert document: database is locked");

        let constraint = StoreError::new("upsert document", "NOT NULL constraint failed");
        assert_eq!(constraint.kind, FailureKind::Permanent);
    }

    #[test]
    fn test_store_error_from_sqlite_busy() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(StoreError::from_sqlite("upsert document", &err).is_transient());

        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            Some("UNIQUE constraint failed".to_string()),
        );
        assert!(!StoreError::from_sqlite("upsert document", &err).is_transient());
    }

    #[test]
    fn test_sync_error_display() {
        let err = SyncError::Fetch(anyhow::anyhow!("connection refused"));
        assert_eq!(err.to_string(), "failed to fetch batch: connection refused");
    }
}
