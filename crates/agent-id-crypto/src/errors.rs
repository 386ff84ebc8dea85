//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic operation errors
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Invalid key size
    #[error("Invalid key size: expected {expected}, got {actual}")]
    InvalidKeySize {
        /// Expected key size in bytes
        expected: usize,
        /// Actual key size in bytes
        actual: usize,
    },

    /// Invalid signature size
    #[error("Invalid signature size: expected {expected}, got {actual}")]
    InvalidSignatureSize {
        /// Expected signature size in bytes
        expected: usize,
        /// Actual signature size in bytes
        actual: usize,
    },

    /// Text encoding could not be decoded
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// The private half of a key pair does not match its public half
    #[error("Key pair mismatch: {0}")]
    KeyPairMismatch(String),

    /// Signature verification failed
    #[error("Signature verification failed")]
    SignatureVerificationFailed,

    /// Master key is not exactly 32 bytes
    #[error("Invalid master key: expected {expected} bytes, got {actual}")]
    InvalidMasterKey {
        /// Expected master key size in bytes
        expected: usize,
        /// Actual master key size in bytes
        actual: usize,
    },

    /// Record was sealed under a different master key version
    #[error("Key version mismatch: vault is at version {vault}, record is at version {record}")]
    KeyVersionMismatch {
        /// Version of the vault doing the operation
        vault: u32,
        /// Version recorded on the sealed record
        record: u32,
    },

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Random number generation failed
    #[error("Random number generation failed: {0}")]
    RandomGenerationFailed(String),

    /// Ed25519 error
    #[error("Ed25519 error: {0}")]
    Ed25519Error(String),
}

/// Result type for cryptographic operations
pub type Result<T> = std::result::Result<T, CryptoError>;
