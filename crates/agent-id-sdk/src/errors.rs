//! SDK error types.

use agent_id_crypto::CryptoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// The backend could not be reached or answered with garbage
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered and refused
    #[error("Backend rejected request ({status} {code}): {message}")]
    Backend {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Invalid credential bundle: {0}")]
    InvalidBundle(String),

    /// Local key material and the backend's key of record disagree
    #[error("Key mismatch: local {local}, backend {backend}")]
    KeyMismatch { local: String, backend: String },

    #[error("No access token available for an authenticated request")]
    MissingToken,

    #[error("Rotation task did not stop within the shutdown timeout")]
    ShutdownTimeout,
}

impl SdkError {
    /// Whether the backend definitively refused, as opposed to an
    /// outcome that is unknown to the caller
    pub fn is_rejection(&self) -> bool {
        matches!(self, SdkError::Backend { status, .. } if (400..500).contains(status))
    }
}

pub type Result<T> = std::result::Result<T, SdkError>;
