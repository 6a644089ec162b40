//! Error types
//!
//! `ApiError` is the crate-wide error. Per-disk variants (corrupt containers,
//! bad flux images) are caught at the scanner boundary and recorded against the
//! disk; the rest propagate to the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Repository failures.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Container corrupt: {path}: {reason}")]
    ContainerCorrupt { path: PathBuf, reason: String },

    #[error("Ambiguous container in {folder}: found {count} ZIP files")]
    AmbiguousContainer { folder: PathBuf, count: usize },

    #[error("Missing container in {folder}")]
    MissingContainer { folder: PathBuf },

    #[error("Magic signature mismatch: found {found}")]
    MagicMismatch { found: String },

    #[error("Truncated chunk {tag}: declared {declared} bytes, {remaining} remaining")]
    TruncatedChunk {
        tag: String,
        declared: u64,
        remaining: u64,
    },

    #[error("Malformed chunk {tag}: {reason}")]
    MalformedChunk { tag: String, reason: String },

    #[error("Unsupported INFO version {found} (highest understood: {supported})")]
    UnsupportedVersion { found: u8, supported: u8 },

    #[error("Remote archive unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Remote item not found: {0}")]
    RemoteNotFound(String),

    #[error("Concurrent run detected: {0}")]
    ConcurrentRunDetected(String),

    #[error("Invalid sync transition: cannot {operation} from {from}")]
    InvalidTransition {
        operation: &'static str,
        from: String,
    },

    #[error("Disk {0} is not marked ready to upload")]
    NotUploadReady(String),

    #[error("Disk not found: {0}")]
    DiskNotFound(String),

    #[error("Root directory not found: {0}")]
    RootNotFound(PathBuf),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::RemoteUnavailable(_))
    }

    /// Failures scoped to a single disk; the pipeline records them and moves on.
    pub fn is_per_disk(&self) -> bool {
        matches!(
            self,
            ApiError::ContainerCorrupt { .. }
                | ApiError::AmbiguousContainer { .. }
                | ApiError::MissingContainer { .. }
                | ApiError::MagicMismatch { .. }
                | ApiError::TruncatedChunk { .. }
                | ApiError::MalformedChunk { .. }
                | ApiError::UnsupportedVersion { .. }
        )
    }
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}

impl From<sled::Error> for ApiError {
    fn from(err: sled::Error) -> Self {
        ApiError::StorageError(StorageError::Database(err))
    }
}
