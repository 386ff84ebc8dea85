//! Agent registry type definitions.

use agent_id_crypto::{Challenge, PUBLIC_KEY_SIZE, SIGNATURE_SIZE};
use agent_id_policy::{TrustEvent, TrustSnapshot};
use agent_id_storage::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

const DAY: u64 = 24 * 3600;

/// Lifecycle status of an agent's key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    /// Registered with a client-held key, proof of possession outstanding
    Pending,
    /// Key proven; the agent may act
    Verified,
    /// Temporarily barred from acting
    Suspended,
    /// Permanently barred
    Revoked,
}

impl KeyStatus {
    /// Whether requests signed by the agent may be approved
    pub fn can_act(&self) -> bool {
        matches!(self, KeyStatus::Verified)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStatus::Pending => "pending",
            KeyStatus::Verified => "verified",
            KeyStatus::Suspended => "suspended",
            KeyStatus::Revoked => "revoked",
        }
    }
}

/// Registered agent identity
///
/// Exactly one public key is active. After a rotation the prior key stays
/// valid for verification until `previous_key_grace_until`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub agent_id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub public_key: [u8; PUBLIC_KEY_SIZE],
    pub key_status: KeyStatus,
    pub key_created_at: u64,
    pub key_expires_at: u64,
    pub rotation_count: u32,
    pub previous_public_key: Option<[u8; PUBLIC_KEY_SIZE]>,
    pub previous_key_grace_until: Option<u64>,
    /// Trust score in [0, 100]
    pub trust_score: f64,
    pub trust_updated_at: u64,
    /// Action types the agent may perform; `*` grants all
    pub capabilities: BTreeSet<String>,
    /// The vault holds this agent's private key
    pub server_held_key: bool,
    pub created_at: u64,
    pub last_verified_at: Option<u64>,
    pub last_rotated_at: Option<u64>,
}

impl AgentIdentity {
    pub fn trust_snapshot(&self) -> TrustSnapshot {
        TrustSnapshot {
            score: self.trust_score,
            updated_at: self.trust_updated_at,
        }
    }

    /// Prior key, while still inside its grace window
    pub fn grace_key(&self, now: u64) -> Option<[u8; PUBLIC_KEY_SIZE]> {
        match (self.previous_public_key, self.previous_key_grace_until) {
            (Some(key), Some(until)) if now < until => Some(key),
            _ => None,
        }
    }

    /// Keys a signature may verify against: current first, then the grace key
    pub fn verification_keys(&self, now: u64) -> Vec<[u8; PUBLIC_KEY_SIZE]> {
        let mut keys = vec![self.public_key];
        keys.extend(self.grace_key(now));
        keys
    }

    pub fn in_grace_period(&self, now: u64) -> bool {
        self.grace_key(now).is_some()
    }

    /// Whole days until the current key expires; negative once expired
    pub fn days_until_expiry(&self, now: u64) -> i64 {
        (self.key_expires_at as i64 - now as i64).div_euclid(DAY as i64)
    }
}

/// Registry settings
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Lifetime of a key from creation
    pub key_validity_seconds: u64,
    /// Rotation is due once expiry is this close
    pub rotation_window_seconds: u64,
    /// How long the prior key keeps verifying after a rotation
    pub grace_period_seconds: u64,
    /// Accepted clock difference for rotation request timestamps
    pub rotation_request_window_seconds: u64,
    /// Trust score of a newly registered agent
    pub initial_trust_score: f64,
    /// Retry settings for vault record operations
    pub retry: RetryPolicy,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            key_validity_seconds: 90 * DAY,
            rotation_window_seconds: 7 * DAY,
            grace_period_seconds: DAY,
            rotation_request_window_seconds: 300,
            initial_trust_score: 50.0,
            retry: RetryPolicy::default(),
        }
    }
}

/// Registration input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterAgentRequest {
    pub organization_id: Uuid,
    pub name: String,
    pub capabilities: BTreeSet<String>,
    /// Client-held public key; `None` lets the server generate and seal a key
    pub public_key: Option<[u8; PUBLIC_KEY_SIZE]>,
}

/// Registration result
#[derive(Debug, Clone)]
pub struct Registration {
    pub agent: AgentIdentity,
    /// Proof-of-possession challenge for client-held keys
    pub challenge: Option<Challenge>,
}

/// Key status as reported to the rotation agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyStatusReport {
    pub agent_id: Uuid,
    pub key_status: KeyStatus,
    pub public_key: [u8; PUBLIC_KEY_SIZE],
    pub key_created_at: u64,
    pub key_expires_at: u64,
    pub days_until_expiry: i64,
    pub should_rotate: bool,
    pub in_grace_period: bool,
    pub previous_key_grace_until: Option<u64>,
    pub rotation_count: u32,
}

/// Request to replace the agent's public key
///
/// `signature` is made with the current private key over
/// `canonicalize_rotation_message(agent_id, new_public_key, timestamp)`.
#[derive(Debug, Clone)]
pub struct KeyRotationRequest {
    pub agent_id: Uuid,
    pub new_public_key: [u8; PUBLIC_KEY_SIZE],
    pub timestamp: u64,
    pub signature: [u8; SIGNATURE_SIZE],
}

/// Acknowledgement of an accepted rotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationReceipt {
    pub agent_id: Uuid,
    pub public_key: [u8; PUBLIC_KEY_SIZE],
    pub key_created_at: u64,
    pub key_expires_at: u64,
    pub rotation_count: u32,
    pub previous_key_grace_until: Option<u64>,
    pub rotated_at: u64,
}

impl RotationReceipt {
    pub(crate) fn for_agent(agent: &AgentIdentity) -> Self {
        Self {
            agent_id: agent.agent_id,
            public_key: agent.public_key,
            key_created_at: agent.key_created_at,
            key_expires_at: agent.key_expires_at,
            rotation_count: agent.rotation_count,
            previous_key_grace_until: agent.previous_key_grace_until,
            rotated_at: agent.last_rotated_at.unwrap_or(agent.key_created_at),
        }
    }
}

/// Outcome of re-sealing every vault record under a new master key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultRotationReport {
    pub new_version: u32,
    pub rotated: usize,
    /// Records that failed to open; left untouched for manual re-issuance
    pub corrupted: Vec<Uuid>,
}

/// Persisted trust score change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustEventRecord {
    pub agent_id: Uuid,
    pub sequence: u64,
    pub event: TrustEvent,
    pub verification_id: Option<Uuid>,
    pub score_before: f64,
    pub score_after: f64,
    pub timestamp: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(now: u64) -> AgentIdentity {
        AgentIdentity {
            agent_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            name: "agent".to_string(),
            public_key: [1u8; PUBLIC_KEY_SIZE],
            key_status: KeyStatus::Verified,
            key_created_at: now,
            key_expires_at: now + 10 * DAY,
            rotation_count: 0,
            previous_public_key: Some([2u8; PUBLIC_KEY_SIZE]),
            previous_key_grace_until: Some(now + 60),
            trust_score: 50.0,
            trust_updated_at: now,
            capabilities: BTreeSet::new(),
            server_held_key: false,
            created_at: now,
            last_verified_at: None,
            last_rotated_at: None,
        }
    }

    #[test]
    fn test_grace_key_window() {
        let agent = agent(1000);

        assert_eq!(agent.verification_keys(1000).len(), 2);
        assert!(agent.in_grace_period(1059));
        assert!(!agent.in_grace_period(1060));
        assert_eq!(agent.verification_keys(1060), vec![[1u8; PUBLIC_KEY_SIZE]]);
    }

    #[test]
    fn test_days_until_expiry() {
        let agent = agent(0);

        assert_eq!(agent.days_until_expiry(0), 10);
        assert_eq!(agent.days_until_expiry(DAY / 2), 9);
        assert_eq!(agent.days_until_expiry(11 * DAY), -1);
    }

    #[test]
    fn test_only_verified_can_act() {
        assert!(KeyStatus::Verified.can_act());
        assert!(!KeyStatus::Pending.can_act());
        assert!(!KeyStatus::Suspended.can_act());
        assert!(!KeyStatus::Revoked.can_act());
        assert_eq!(serde_json::to_string(&KeyStatus::Suspended).unwrap(), "\"suspended\"");
    }
}
