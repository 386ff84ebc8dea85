//! Verification request, result and audit record types.

use agent_id_policy::{PolicyViolation, RiskLevel};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Signed action request from an agent
///
/// Ephemeral: only its audit summary is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionVerificationRequest {
    /// Idempotency key
    pub verification_id: Uuid,
    pub agent_id: Uuid,
    pub action_type: String,
    pub resource: String,
    pub risk_level: RiskLevel,
    /// Free-form caller context; not signed, not persisted
    #[serde(default)]
    pub context: serde_json::Value,
    pub nonce: String,
    pub timestamp: u64,
    /// Base64 Ed25519 signature over the canonical action message
    pub signature: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Approved,
    Denied,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Approved => "approved",
            VerificationStatus::Denied => "denied",
        }
    }
}

/// Why a request was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// Agent is pending, suspended or revoked
    AgentSuspended,
    InvalidSignature,
    StaleRequest,
    ReplayedNonce,
    InsufficientTrust,
    PolicyViolation,
    /// Policies could not be evaluated and the risk tier fails closed
    PolicyUnavailable,
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::AgentSuspended => "agent_suspended",
            DenialReason::InvalidSignature => "invalid_signature",
            DenialReason::StaleRequest => "stale_request",
            DenialReason::ReplayedNonce => "replayed_nonce",
            DenialReason::InsufficientTrust => "insufficient_trust",
            DenialReason::PolicyViolation => "policy_violation",
            DenialReason::PolicyUnavailable => "policy_unavailable",
        }
    }

    /// Failures of proof rather than of permission
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            DenialReason::InvalidSignature
                | DenialReason::StaleRequest
                | DenialReason::ReplayedNonce
        )
    }
}

/// Immutable decision record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub verification_id: Uuid,
    pub agent_id: Uuid,
    pub organization_id: Uuid,
    pub action_type: String,
    pub resource: String,
    pub risk_level: RiskLevel,
    pub status: VerificationStatus,
    pub denial_reason: Option<DenialReason>,
    /// Approved despite a matched policy or an unavailable policy check
    pub alerted: bool,
    pub trust_score_before: f64,
    pub trust_score_after: f64,
    pub policy_violations: Vec<PolicyViolation>,
    pub timestamp: u64,
    pub duration_ms: u64,
    /// Hex SHA-256 over the signed message, signature and risk level
    ///
    /// A repeated `verification_id` only returns this result when the new
    /// request hashes to the same value.
    pub request_digest: String,
}

impl VerificationResult {
    pub fn is_approved(&self) -> bool {
        self.status == VerificationStatus::Approved
    }
}

/// Compliance record of one verification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: Uuid,
    pub verification_id: Uuid,
    /// Acting agent
    pub actor: Uuid,
    pub organization_id: Uuid,
    pub action: String,
    pub resource: String,
    pub risk_level: RiskLevel,
    pub status: VerificationStatus,
    pub denial_reason: Option<DenialReason>,
    pub tags: Vec<String>,
    pub timestamp: u64,
}

/// Operator-facing alert raised during verification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyAlert {
    pub alert_id: Uuid,
    pub organization_id: Uuid,
    pub agent_id: Uuid,
    pub verification_id: Uuid,
    /// Policy that matched, if any
    pub policy_id: Option<Uuid>,
    pub policy_name: Option<String>,
    pub message: String,
    /// The alert belongs to the decision that denied the request
    pub blocking: bool,
    pub timestamp: u64,
}
