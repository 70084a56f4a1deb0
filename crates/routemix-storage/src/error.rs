//! Storage error types.

use thiserror::Error;

/// Errors that can occur in group-store operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// IO error while writing the store file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The named group does not exist.
    #[error("no such group: {0}")]
    GroupNotFound(String),

    /// A group with that name already exists.
    #[error("group already exists: {0}")]
    GroupExists(String),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
