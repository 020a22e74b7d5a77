//! Error types for blobmend.
//!
//! Every failure a rename run can hit maps onto one variant here. Per-candidate
//! errors are folded into a [`crate::RenameOutcome`] by the executor, so only
//! listing and start-up failures ever reach the caller of a run.

use crate::storage::CopyStatus;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the blobmend library.
#[derive(Debug, Error)]
pub enum BlobmendError {
    // Object storage errors
    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Object not found in container: {name}")]
    ObjectNotFound { name: String },

    #[error("Storage unavailable for container '{container}' after {attempts} attempt(s): {message}")]
    StorageUnavailable {
        container: String,
        attempts: u32,
        message: String,
    },

    #[error("Copy from '{source_name}' to '{target_name}' finished with status {status}")]
    CopyFailed {
        source_name: String,
        target_name: String,
        status: CopyStatus,
    },

    #[error("Copy to '{target_name}' still pending after {waited:?}")]
    CopyTimedOut { target_name: String, waited: Duration },

    // Relational store errors
    #[error("Reference store unavailable: {message}")]
    StoreUnavailable {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error(
        "Rollback failed for record {record_id}: reference points at '{new_name}' \
         but object is still '{old_name}': {message}"
    )]
    RollbackFailed {
        record_id: String,
        old_name: String,
        new_name: String,
        message: String,
    },

    // Naming policy errors
    #[error("Naming policy violation for '{name}': {message}")]
    PolicyViolation { name: String, message: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for blobmend operations.
pub type Result<T> = std::result::Result<T, BlobmendError>;

impl From<std::io::Error> for BlobmendError {
    fn from(err: std::io::Error) -> Self {
        BlobmendError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for BlobmendError {
    fn from(err: rusqlite::Error) -> Self {
        BlobmendError::StoreUnavailable {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl BlobmendError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        BlobmendError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a storage error from an IO failure inside an object store backend.
    pub fn storage(message: impl Into<String>, err: std::io::Error) -> Self {
        BlobmendError::Storage {
            message: format!("{}: {}", message.into(), err),
            source: Some(err),
        }
    }

    /// Check if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BlobmendError::Storage { .. } | BlobmendError::StorageUnavailable { .. }
        )
    }

    /// True for the one state a run cannot heal by itself.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, BlobmendError::RollbackFailed { .. })
    }

    /// Short machine-friendly name of the error kind, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            BlobmendError::Storage { .. } => "storage",
            BlobmendError::ObjectNotFound { .. } => "object_not_found",
            BlobmendError::StorageUnavailable { .. } => "storage_unavailable",
            BlobmendError::CopyFailed { .. } => "copy_failed",
            BlobmendError::CopyTimedOut { .. } => "copy_timed_out",
            BlobmendError::StoreUnavailable { .. } => "store_unavailable",
            BlobmendError::RollbackFailed { .. } => "rollback_failed",
            BlobmendError::PolicyViolation { .. } => "policy_violation",
            BlobmendError::Config { .. } => "config",
            BlobmendError::Io { .. } => "io",
            BlobmendError::Other(_) => "other",
        }
    }
}
