//! Policy engine error types.

use thiserror::Error;
use uuid::Uuid;

/// Policy engine errors
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Policy does not exist
    #[error("Policy not found: {0}")]
    NotFound(Uuid),

    /// Policy definition rejected
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    /// Storage failure
    #[error("Storage error: {0}")]
    Storage(#[from] agent_id_storage::StorageError),
}

/// Result type for policy operations
pub type Result<T> = std::result::Result<T, PolicyError>;
