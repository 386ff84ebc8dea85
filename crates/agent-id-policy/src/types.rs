//! Policy engine type definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Risk level declared on an action request
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low = 0x01,
    Medium = 0x02,
    High = 0x03,
    Critical = 0x04,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [
        RiskLevel::Low,
        RiskLevel::Medium,
        RiskLevel::High,
        RiskLevel::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            "critical" => Some(RiskLevel::Critical),
            _ => None,
        }
    }
}

/// What happens when a policy matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementAction {
    /// Observe only: log an alert, never block
    AlertOnly,
    /// Block the action and log an alert
    BlockAndAlert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyType {
    CapabilityViolation,
    LowTrustScore,
    UnusualActivity,
    RestrictedResource,
}

/// Rule carried by a policy, with its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyRule {
    /// Action type is not in the agent's capability set
    CapabilityViolation,
    /// Agent trust score below `min_score`
    LowTrustScore { min_score: f64 },
    /// More than `max_actions` within the trailing `window_seconds`
    UnusualActivity { max_actions: u32, window_seconds: u64 },
    /// Resource starts with one of the prefixes
    RestrictedResource { prefixes: Vec<String> },
}

impl PolicyRule {
    pub fn policy_type(&self) -> PolicyType {
        match self {
            PolicyRule::CapabilityViolation => PolicyType::CapabilityViolation,
            PolicyRule::LowTrustScore { .. } => PolicyType::LowTrustScore,
            PolicyRule::UnusualActivity { .. } => PolicyType::UnusualActivity,
            PolicyRule::RestrictedResource { .. } => PolicyType::RestrictedResource,
        }
    }

    /// Reject parameters that can never be meaningful
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            PolicyRule::CapabilityViolation => Ok(()),
            PolicyRule::LowTrustScore { min_score } => {
                if !(0.0..=100.0).contains(min_score) {
                    return Err(format!("min_score {} outside [0, 100]", min_score));
                }
                Ok(())
            }
            PolicyRule::UnusualActivity {
                max_actions,
                window_seconds,
            } => {
                if *max_actions == 0 || *window_seconds == 0 {
                    return Err("max_actions and window_seconds must be positive".to_string());
                }
                Ok(())
            }
            PolicyRule::RestrictedResource { prefixes } => {
                if prefixes.is_empty() || prefixes.iter().any(|p| p.is_empty()) {
                    return Err("prefixes must be non-empty".to_string());
                }
                Ok(())
            }
        }
    }
}

/// Security policy owned by an organization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityPolicy {
    pub policy_id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub rule: PolicyRule,
    pub enforcement_action: EnforcementAction,
    /// Lowest request risk level the policy applies to
    pub severity_threshold: RiskLevel,
    /// Higher values are evaluated first
    pub priority: i32,
    pub enabled: bool,
    pub created_at: u64,
    /// Creation order, breaks priority ties
    pub sequence: u64,
}

impl SecurityPolicy {
    pub fn policy_type(&self) -> PolicyType {
        self.rule.policy_type()
    }

    /// Whether the policy is enabled and covers a request of this risk level
    pub fn applies_to(&self, organization_id: Uuid, risk_level: RiskLevel) -> bool {
        self.enabled
            && self.organization_id == organization_id
            && risk_level >= self.severity_threshold
    }
}

/// Input for creating a policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPolicy {
    pub organization_id: Uuid,
    pub name: String,
    pub rule: PolicyRule,
    pub enforcement_action: EnforcementAction,
    pub severity_threshold: RiskLevel,
    pub priority: i32,
    pub enabled: bool,
}

/// Partial update of a policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyUpdate {
    pub name: Option<String>,
    pub rule: Option<PolicyRule>,
    pub enforcement_action: Option<EnforcementAction>,
    pub severity_threshold: Option<RiskLevel>,
    pub priority: Option<i32>,
    pub enabled: Option<bool>,
}

/// Verification event as seen by the policy engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyContext {
    pub agent_id: Uuid,
    pub organization_id: Uuid,
    pub action_type: String,
    pub resource: String,
    pub risk_level: RiskLevel,
    pub trust_score: f64,
    pub capabilities: BTreeSet<String>,
    /// Timestamps of the agent's recent actions, including this one
    pub recent_actions: Vec<u64>,
    pub timestamp: u64,
}

impl PolicyContext {
    /// Number of recent actions inside the trailing window
    pub fn actions_within(&self, window_seconds: u64) -> u32 {
        let since = self.timestamp.saturating_sub(window_seconds);
        self.recent_actions.iter().filter(|&&ts| ts > since).count() as u32
    }
}

/// One matched policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyViolation {
    pub policy_id: Uuid,
    pub policy_name: String,
    pub policy_type: PolicyType,
    pub enforcement_action: EnforcementAction,
    pub priority: i32,
    pub message: String,
}

impl PolicyViolation {
    pub fn is_blocking(&self) -> bool {
        self.enforcement_action == EnforcementAction::BlockAndAlert
    }
}

/// Outcome of evaluating every applicable policy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyEvaluation {
    /// Every matched policy, in evaluation order
    pub violations: Vec<PolicyViolation>,
    /// First matched `BlockAndAlert` policy
    pub blocked_by: Option<Uuid>,
    pub audit_tags: Vec<String>,
}

impl PolicyEvaluation {
    pub fn is_blocked(&self) -> bool {
        self.blocked_by.is_some()
    }

    pub fn blocking_violation(&self) -> Option<&PolicyViolation> {
        let blocked_by = self.blocked_by?;
        self.violations.iter().find(|v| v.policy_id == blocked_by)
    }
}
