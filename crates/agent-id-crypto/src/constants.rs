//! Cryptographic constants and domain separation strings.

/// Size of Ed25519 public keys in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of Ed25519 private keys in bytes (seed || public key)
pub const PRIVATE_KEY_SIZE: usize = 64;

/// Size of Ed25519 seeds in bytes
pub const SEED_SIZE: usize = 32;

/// Size of Ed25519 signatures in bytes
pub const SIGNATURE_SIZE: usize = 64;

/// Size of the vault master key in bytes (AES-256)
pub const MASTER_KEY_SIZE: usize = 32;

/// Size of AES-GCM nonces in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Size of AES-GCM authentication tags in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Size of proof-of-possession challenges in bytes
pub const CHALLENGE_SIZE: usize = 32;

/// Challenge expiry time in seconds (5 minutes)
pub const CHALLENGE_EXPIRY_SECONDS: u64 = 300;

/// Version byte prefixed to every canonical signed message
pub const CANONICAL_MESSAGE_VERSION: u8 = 0x01;

/// AAD domain for private keys sealed by the vault
/// Format: "agent-id:vault:private-key:v1" || agent_id
pub const DOMAIN_PRIVATE_KEY_AAD: &str = "agent-id:vault:private-key:v1";
