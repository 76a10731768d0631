//! Error types shared across the workspace.

use std::path::PathBuf;

use thiserror::Error;

use crate::db::EntityId;
use crate::hash::ContentHash;

/// Errors raised by the metadata log and the content store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Content for a hash is not present in the store.
    #[error("Content not found in store: {hash}")]
    MissingContent { hash: ContentHash },

    /// Stored bytes did not hash to the expected value.
    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        expected: ContentHash,
        actual: ContentHash,
    },

    /// The metadata log rejected a transaction.
    #[error("Commit failed: {message}")]
    CommitFailed { message: String },

    /// Entity is not present in the queried snapshot.
    #[error("Entity not found: {id}")]
    EntityNotFound { id: EntityId },

    /// Operation was cancelled.
    #[error("Operation interrupted")]
    Interrupted,
}

impl StoreError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors that can occur during scanning.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Operation was interrupted.
    #[error("Operation interrupted")]
    Interrupted,
}

impl ScanError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_error_io() {
        let err = ScanError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, ScanError::PermissionDenied { .. }));

        let err = ScanError::io("/test/path", std::io::Error::other("boom"));
        assert!(matches!(err, ScanError::Io { .. }));
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::CommitFailed {
            message: "conflict".into(),
        };
        assert_eq!(err.to_string(), "Commit failed: conflict");
    }
}
