//! Agent registry error types.

use crate::types::KeyStatus;
use thiserror::Error;
use uuid::Uuid;

/// Agent registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Agent not found
    #[error("Agent not found: {0}")]
    AgentNotFound(Uuid),

    /// Operation not allowed in the agent's current key status
    #[error("Invalid key status: status={status:?}, reason={reason}")]
    InvalidKeyStatus { status: KeyStatus, reason: String },

    /// Challenge not found
    #[error("Challenge not found: {0}")]
    ChallengeNotFound(Uuid),

    /// Challenge expired
    #[error("Challenge expired")]
    ChallengeExpired,

    /// Challenge already answered
    #[error("Challenge already used")]
    ChallengeAlreadyUsed,

    /// Signature does not verify against the expected key
    #[error("Invalid signature")]
    InvalidSignature,

    /// Rotation request timestamp outside the accepted window
    #[error("Stale rotation request: timestamp={timestamp}, now={now}")]
    StaleRotationRequest { timestamp: u64, now: u64 },

    /// The current key has expired and can no longer authorize a rotation
    #[error("Current key expired at {expires_at}")]
    KeyExpired { expires_at: u64 },

    /// Rotation request does not change the key
    #[error("New public key equals the current key")]
    KeyReuse,

    /// The server does not hold a private key for this agent
    #[error("No server-held key for agent: {0}")]
    NoServerHeldKey(Uuid),

    /// Stored key material failed to decrypt or verify; requires manual re-issuance
    #[error("Key material corrupted for agent: {0}")]
    KeyMaterialCorrupted(Uuid),

    /// Malformed registration input
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] agent_id_storage::StorageError),

    /// Cryptographic error
    #[error("Cryptographic error: {0}")]
    Crypto(#[from] agent_id_crypto::CryptoError),
}

impl RegistryError {
    /// Whether the failure comes from infrastructure and may succeed on retry
    pub fn is_transient(&self) -> bool {
        matches!(self, RegistryError::Storage(e) if e.is_transient())
    }
}

/// Result type for agent registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
