//! Storage error types.

use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Not found
    #[error("Key not found")]
    NotFound,

    /// Already exists
    #[error("Key already exists")]
    AlreadyExists,

    /// Invalid column family
    #[error("Invalid column family: {0}")]
    InvalidColumnFamily(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl StorageError {
    /// Whether retrying the operation may succeed
    ///
    /// Encoding problems and missing column families are permanent.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Database(_) | StorageError::IoError(_))
    }
}

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;
