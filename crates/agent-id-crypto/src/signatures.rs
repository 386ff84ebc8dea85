//! Digital signature operations using Ed25519.

use crate::{constants::*, errors::*, keys::AgentKeyPair};
use ed25519_dalek::{Signature, Signer, VerifyingKey};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Proof-of-possession challenge issued to an agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Challenge {
    /// Unique challenge ID
    pub challenge_id: Uuid,
    /// Agent this challenge was issued to
    pub agent_id: Uuid,
    /// Random nonce
    pub nonce: [u8; CHALLENGE_SIZE],
    /// Issued at timestamp
    pub issued_at: u64,
    /// Expiry timestamp
    pub expires_at: u64,
    /// Whether the challenge has been answered (replay protection)
    pub used: bool,
}

impl Challenge {
    /// Issue a fresh challenge for an agent
    pub fn new(agent_id: Uuid, now: u64) -> Result<Self> {
        Ok(Self {
            challenge_id: Uuid::new_v4(),
            agent_id,
            nonce: generate_challenge()?,
            issued_at: now,
            expires_at: now + CHALLENGE_EXPIRY_SECONDS,
            used: false,
        })
    }

    /// Check whether the challenge can no longer be answered
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

/// Generate 32 random bytes for a proof-of-possession handshake
pub fn generate_challenge() -> Result<[u8; CHALLENGE_SIZE]> {
    let mut nonce = [0u8; CHALLENGE_SIZE];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|e| CryptoError::RandomGenerationFailed(e.to_string()))?;
    Ok(nonce)
}

/// Sign a message with Ed25519
///
/// # Returns
///
/// 64-byte Ed25519 signature
pub fn sign_message(keypair: &AgentKeyPair, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
    keypair.signing_key().sign(message).to_bytes()
}

/// Verify an Ed25519 signature
///
/// Uses strict verification, so malleable and small-order encodings are rejected.
///
/// # Returns
///
/// `Ok(())` if signature is valid, `Err` otherwise
pub fn verify_signature(
    public_key: &[u8; PUBLIC_KEY_SIZE],
    message: &[u8],
    signature: &[u8; SIGNATURE_SIZE],
) -> Result<()> {
    let verifying_key = VerifyingKey::from_bytes(public_key)
        .map_err(|e| CryptoError::Ed25519Error(e.to_string()))?;

    let sig = Signature::from_bytes(signature);

    verifying_key
        .verify_strict(message, &sig)
        .map_err(|_| CryptoError::SignatureVerificationFailed)
}

fn push_length_prefixed(message: &mut Vec<u8>, field: &str) {
    message.extend_from_slice(&(field.len() as u32).to_be_bytes());
    message.extend_from_slice(field.as_bytes());
}

/// Create the canonical binary message an agent signs for an action request
///
/// Format: version(1) || agent_id(16) || timestamp(8) ||
///         len(4) || nonce || len(4) || action_type || len(4) || resource
///
/// Lengths and the timestamp are big-endian.
pub fn canonicalize_action_message(
    agent_id: &Uuid,
    timestamp: u64,
    nonce: &str,
    action_type: &str,
    resource: &str,
) -> Vec<u8> {
    let mut message =
        Vec::with_capacity(1 + 16 + 8 + 12 + nonce.len() + action_type.len() + resource.len());

    message.push(CANONICAL_MESSAGE_VERSION);
    message.extend_from_slice(agent_id.as_bytes());
    message.extend_from_slice(&timestamp.to_be_bytes());
    push_length_prefixed(&mut message, nonce);
    push_length_prefixed(&mut message, action_type);
    push_length_prefixed(&mut message, resource);

    message
}

/// Create the canonical binary message for a key rotation submission
///
/// Signed with the agent's current key to prove continuity of identity.
///
/// Format: version(1) || agent_id(16) || new_public_key(32) || timestamp(8)
///
/// Total: 57 bytes
pub fn canonicalize_rotation_message(
    agent_id: &Uuid,
    new_public_key: &[u8; PUBLIC_KEY_SIZE],
    timestamp: u64,
) -> [u8; 57] {
    let mut message = [0u8; 57];

    message[0] = CANONICAL_MESSAGE_VERSION;
    message[1..17].copy_from_slice(agent_id.as_bytes());
    message[17..49].copy_from_slice(new_public_key);
    message[49..57].copy_from_slice(&timestamp.to_be_bytes());

    message
}

/// Create the canonical binary message for a proof-of-possession challenge
///
/// Format: version(1) || challenge_id(16) || agent_id(16) || nonce(32) ||
///         issued_at(8) || expires_at(8)
///
/// Total: 81 bytes
pub fn canonicalize_challenge(challenge: &Challenge) -> [u8; 81] {
    let mut message = [0u8; 81];

    message[0] = CANONICAL_MESSAGE_VERSION;
    message[1..17].copy_from_slice(challenge.challenge_id.as_bytes());
    message[17..33].copy_from_slice(challenge.agent_id.as_bytes());
    message[33..65].copy_from_slice(&challenge.nonce);
    message[65..73].copy_from_slice(&challenge.issued_at.to_be_bytes());
    message[73..81].copy_from_slice(&challenge.expires_at.to_be_bytes());

    message
}
