//! Agent key generation and text encoding.
//!
//! Private keys travel as the 64-byte Ed25519 keypair form (seed || public key)
//! and public keys as the raw 32 bytes, both in standard base64.

use crate::{constants::*, errors::*};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, Zeroizing};

/// Ed25519 key pair owned by an agent
#[derive(Clone, PartialEq, Eq)]
pub struct AgentKeyPair {
    signing_key: SigningKey,
}

impl fmt::Debug for AgentKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentKeyPair")
            .field("public_key", &encode_public_key(&self.public_key_bytes()))
            .finish_non_exhaustive()
    }
}

impl AgentKeyPair {
    /// Generate a new key pair from the operating system CSPRNG
    pub fn generate() -> Result<Self> {
        let mut seed = [0u8; SEED_SIZE];
        OsRng
            .try_fill_bytes(&mut seed)
            .map_err(|e| CryptoError::RandomGenerationFailed(e.to_string()))?;
        let keypair = Self::from_seed(&seed);
        seed.zeroize();
        Ok(keypair)
    }

    /// Build a key pair from a 32-byte seed
    pub fn from_seed(seed: &[u8; SEED_SIZE]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Build a key pair from its 64-byte private key form
    ///
    /// Fails with `InvalidKeySize` on a length mismatch and `KeyPairMismatch`
    /// when the embedded public key does not belong to the seed.
    pub fn from_keypair_bytes(bytes: &[u8]) -> Result<Self> {
        let raw: &[u8; PRIVATE_KEY_SIZE] =
            bytes.try_into().map_err(|_| CryptoError::InvalidKeySize {
                expected: PRIVATE_KEY_SIZE,
                actual: bytes.len(),
            })?;

        let signing_key = SigningKey::from_keypair_bytes(raw)
            .map_err(|e| CryptoError::KeyPairMismatch(e.to_string()))?;

        Ok(Self { signing_key })
    }

    /// The 64-byte private key form (seed || public key)
    ///
    /// # Security
    ///
    /// Never log or persist these bytes outside the vault or the credential bundle.
    pub fn to_keypair_bytes(&self) -> Zeroizing<[u8; PRIVATE_KEY_SIZE]> {
        Zeroizing::new(self.signing_key.to_keypair_bytes())
    }

    /// Get the public key bytes
    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Get the public verification key
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// Encode both halves as base64 text
    pub fn encode(&self) -> EncodedKeyPair {
        EncodedKeyPair {
            public_key: encode_public_key(&self.public_key_bytes()),
            private_key: encode_private_key(self),
        }
    }

    /// Decode a key pair from its text form
    ///
    /// The public half must match the one embedded in the private key.
    pub fn decode(encoded: &EncodedKeyPair) -> Result<Self> {
        let keypair = decode_private_key(&encoded.private_key)?;
        let public_key = decode_public_key(&encoded.public_key)?;

        if keypair.public_key_bytes() != public_key {
            return Err(CryptoError::KeyPairMismatch(
                "public key does not match private key".to_string(),
            ));
        }

        Ok(keypair)
    }
}

/// Text form of an agent key pair
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncodedKeyPair {
    /// Base64 public key (32 raw bytes)
    pub public_key: String,
    /// Base64 private key (64 raw bytes)
    pub private_key: String,
}

impl fmt::Debug for EncodedKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedKeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Encode a public key as base64
pub fn encode_public_key(public_key: &[u8; PUBLIC_KEY_SIZE]) -> String {
    STANDARD.encode(public_key)
}

/// Decode a base64 public key
pub fn decode_public_key(encoded: &str) -> Result<[u8; PUBLIC_KEY_SIZE]> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?;

    let public_key: [u8; PUBLIC_KEY_SIZE] =
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKeySize {
                expected: PUBLIC_KEY_SIZE,
                actual: bytes.len(),
            })?;

    validate_public_key(&public_key)?;

    Ok(public_key)
}

/// Check that raw bytes are a valid Ed25519 point
pub fn validate_public_key(public_key: &[u8; PUBLIC_KEY_SIZE]) -> Result<()> {
    VerifyingKey::from_bytes(public_key).map_err(|e| CryptoError::Ed25519Error(e.to_string()))?;
    Ok(())
}

/// Encode a private key (64-byte keypair form) as base64
pub fn encode_private_key(keypair: &AgentKeyPair) -> String {
    STANDARD.encode(keypair.to_keypair_bytes().as_ref())
}

/// Decode a base64 private key (64-byte keypair form)
pub fn decode_private_key(encoded: &str) -> Result<AgentKeyPair> {
    let bytes = Zeroizing::new(
        STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?,
    );
    AgentKeyPair::from_keypair_bytes(&bytes)
}

/// Encode a signature as base64
pub fn encode_signature(signature: &[u8; SIGNATURE_SIZE]) -> String {
    STANDARD.encode(signature)
}

/// Decode a base64 signature
pub fn decode_signature(encoded: &str) -> Result<[u8; SIGNATURE_SIZE]> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?;

    bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidSignatureSize {
            expected: SIGNATURE_SIZE,
            actual: bytes.len(),
        })
}
