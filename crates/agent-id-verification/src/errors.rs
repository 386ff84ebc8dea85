//! Verification pipeline error types.

use thiserror::Error;
use uuid::Uuid;

/// Verification errors
///
/// Decisions (approved or denied) are results, not errors. Errors mean the
/// request could not be processed at all.
#[derive(Debug, Error)]
pub enum VerificationError {
    /// No agent with this ID
    #[error("Unknown agent: {0}")]
    UnknownAgent(Uuid),

    /// Malformed request; nothing was recorded
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Registry error
    #[error("Registry error: {0}")]
    Registry(#[from] agent_id_registry::RegistryError),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] agent_id_storage::StorageError),
}

impl VerificationError {
    pub fn is_transient(&self) -> bool {
        match self {
            VerificationError::Storage(e) => e.is_transient(),
            VerificationError::Registry(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Result type for verification operations
pub type Result<T> = std::result::Result<T, VerificationError>;
