//! RocksDB column family definitions.

/// Agent identities: agent_id → AgentIdentity
pub const CF_AGENTS: &str = "agents";

/// Agents by organization index: (organization_id, agent_id) → agent_id
pub const CF_AGENTS_BY_ORG: &str = "agents_by_org";

/// Vault-sealed private keys: agent_id → PrivateKeyRecord
pub const CF_PRIVATE_KEYS: &str = "private_keys";

/// Proof-of-possession challenges: challenge_id → Challenge (TTL: 5 min)
pub const CF_CHALLENGES: &str = "challenges";

/// Verification results (append-only): verification_id → VerificationResult
pub const CF_VERIFICATIONS: &str = "verifications";

/// Audit entries (append-only): (agent_id, entry_id) → AuditEntry
pub const CF_AUDIT_LOG: &str = "audit_log";

/// Policy alerts (append-only): (organization_id, alert_id) → PolicyAlert
pub const CF_POLICY_ALERTS: &str = "policy_alerts";

/// Security policies: policy_id → SecurityPolicy
pub const CF_SECURITY_POLICIES: &str = "security_policies";

/// Security policies by organization index: (organization_id, policy_id) → policy_id
pub const CF_SECURITY_POLICIES_BY_ORG: &str = "security_policies_by_org";

/// Monotonic counters: name → u64
pub const CF_SEQUENCES: &str = "sequences";

/// Trust score history: (agent_id, event_id) → TrustEvent
pub const CF_TRUST_EVENTS: &str = "trust_events";

/// Used action nonces: (agent_id, nonce) → expiry_timestamp
pub const CF_USED_NONCES: &str = "used_nonces";

/// Revoked tokens: jti → expiry_timestamp
pub const CF_REVOKED_TOKENS: &str = "revoked_tokens";

/// Get all column family names
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        CF_AGENTS,
        CF_AGENTS_BY_ORG,
        CF_PRIVATE_KEYS,
        CF_CHALLENGES,
        CF_VERIFICATIONS,
        CF_AUDIT_LOG,
        CF_POLICY_ALERTS,
        CF_SECURITY_POLICIES,
        CF_SECURITY_POLICIES_BY_ORG,
        CF_SEQUENCES,
        CF_TRUST_EVENTS,
        CF_USED_NONCES,
        CF_REVOKED_TOKENS,
    ]
}
