//! Policy Engine trait and storage-backed implementation.

use crate::{
    errors::{PolicyError, Result},
    evaluator::PolicyEvaluator,
    types::*,
};
use agent_id_crypto::current_timestamp;
use agent_id_storage::{
    column_families::{CF_SECURITY_POLICIES, CF_SECURITY_POLICIES_BY_ORG},
    BatchExt, Storage,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

const POLICY_SEQUENCE: &str = "security_policies";

/// Source of security policies for the verification pipeline
#[async_trait]
pub trait PolicyEngine: Send + Sync {
    /// Every policy owned by an organization, in evaluation order
    async fn policies_for(&self, organization_id: Uuid) -> Result<Vec<SecurityPolicy>>;

    /// Evaluate the organization's policies against a verification event
    async fn evaluate(&self, context: &PolicyContext) -> Result<PolicyEvaluation> {
        let policies = self.policies_for(context.organization_id).await?;
        Ok(PolicyEvaluator::evaluate(&policies, context))
    }
}

/// Default policies seeded for a new organization
///
/// All of them observe only; an organization opts into blocking explicitly.
pub fn default_policies(organization_id: Uuid) -> Vec<NewPolicy> {
    vec![
        NewPolicy {
            organization_id,
            name: "capability-violation".to_string(),
            rule: PolicyRule::CapabilityViolation,
            enforcement_action: EnforcementAction::AlertOnly,
            severity_threshold: RiskLevel::Low,
            priority: 100,
            enabled: true,
        },
        NewPolicy {
            organization_id,
            name: "low-trust-score".to_string(),
            rule: PolicyRule::LowTrustScore { min_score: 50.0 },
            enforcement_action: EnforcementAction::AlertOnly,
            severity_threshold: RiskLevel::Medium,
            priority: 50,
            enabled: true,
        },
        NewPolicy {
            organization_id,
            name: "unusual-activity".to_string(),
            rule: PolicyRule::UnusualActivity {
                max_actions: 120,
                window_seconds: 60,
            },
            enforcement_action: EnforcementAction::AlertOnly,
            severity_threshold: RiskLevel::Low,
            priority: 10,
            enabled: true,
        },
    ]
}

/// Security policies persisted per organization
pub struct SecurityPolicyEngine<S: Storage> {
    storage: Arc<S>,
}

impl<S: Storage> SecurityPolicyEngine<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Create a policy; its creation sequence breaks priority ties
    pub async fn create_policy(&self, new_policy: NewPolicy) -> Result<SecurityPolicy> {
        new_policy.rule.validate().map_err(PolicyError::InvalidPolicy)?;
        if new_policy.name.trim().is_empty() {
            return Err(PolicyError::InvalidPolicy("name must not be empty".to_string()));
        }

        let policy = SecurityPolicy {
            policy_id: Uuid::new_v4(),
            organization_id: new_policy.organization_id,
            name: new_policy.name,
            rule: new_policy.rule,
            enforcement_action: new_policy.enforcement_action,
            severity_threshold: new_policy.severity_threshold,
            priority: new_policy.priority,
            enabled: new_policy.enabled,
            created_at: current_timestamp(),
            sequence: self.storage.next_sequence(POLICY_SEQUENCE).await?,
        };

        let mut batch = self.storage.batch();
        batch.put(CF_SECURITY_POLICIES, &policy.policy_id, &policy)?;
        batch.put(
            CF_SECURITY_POLICIES_BY_ORG,
            &(policy.organization_id, policy.policy_id),
            &policy.policy_id,
        )?;
        batch.commit().await?;

        info!(
            policy_id = %policy.policy_id,
            organization_id = %policy.organization_id,
            name = %policy.name,
            enforcement = ?policy.enforcement_action,
            "Security policy created"
        );

        Ok(policy)
    }

    pub async fn get_policy(&self, policy_id: Uuid) -> Result<SecurityPolicy> {
        self.storage
            .get(CF_SECURITY_POLICIES, &policy_id)
            .await?
            .ok_or(PolicyError::NotFound(policy_id))
    }

    /// Apply a partial update; priority and sequence keep their meaning
    pub async fn update_policy(
        &self,
        policy_id: Uuid,
        update: PolicyUpdate,
    ) -> Result<SecurityPolicy> {
        let mut policy = self.get_policy(policy_id).await?;

        if let Some(rule) = update.rule {
            rule.validate().map_err(PolicyError::InvalidPolicy)?;
            policy.rule = rule;
        }
        if let Some(name) = update.name {
            if name.trim().is_empty() {
                return Err(PolicyError::InvalidPolicy("name must not be empty".to_string()));
            }
            policy.name = name;
        }
        if let Some(action) = update.enforcement_action {
            policy.enforcement_action = action;
        }
        if let Some(threshold) = update.severity_threshold {
            policy.severity_threshold = threshold;
        }
        if let Some(priority) = update.priority {
            policy.priority = priority;
        }
        if let Some(enabled) = update.enabled {
            policy.enabled = enabled;
        }

        self.storage
            .put(CF_SECURITY_POLICIES, &policy.policy_id, &policy)
            .await?;

        info!(
            policy_id = %policy.policy_id,
            enforcement = ?policy.enforcement_action,
            enabled = policy.enabled,
            "Security policy updated"
        );

        Ok(policy)
    }

    /// Switch a policy between alert-only and blocking
    pub async fn set_enforcement(
        &self,
        policy_id: Uuid,
        enforcement_action: EnforcementAction,
    ) -> Result<SecurityPolicy> {
        self.update_policy(
            policy_id,
            PolicyUpdate {
                enforcement_action: Some(enforcement_action),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn set_enabled(&self, policy_id: Uuid, enabled: bool) -> Result<SecurityPolicy> {
        self.update_policy(
            policy_id,
            PolicyUpdate {
                enabled: Some(enabled),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn delete_policy(&self, policy_id: Uuid) -> Result<()> {
        let policy = self.get_policy(policy_id).await?;

        let mut batch = self.storage.batch();
        batch.delete(CF_SECURITY_POLICIES, &policy_id)?;
        batch.delete(
            CF_SECURITY_POLICIES_BY_ORG,
            &(policy.organization_id, policy_id),
        )?;
        batch.commit().await?;

        info!(policy_id = %policy_id, "Security policy deleted");
        Ok(())
    }

    /// All policies of an organization, in evaluation order
    pub async fn list_policies(&self, organization_id: Uuid) -> Result<Vec<SecurityPolicy>> {
        let index: Vec<(Vec<u8>, Uuid)> = self
            .storage
            .get_by_prefix(CF_SECURITY_POLICIES_BY_ORG, &organization_id)
            .await?;

        let mut policies = Vec::with_capacity(index.len());
        for (_, policy_id) in index {
            match self
                .storage
                .get::<_, SecurityPolicy>(CF_SECURITY_POLICIES, &policy_id)
                .await?
            {
                Some(policy) => policies.push(policy),
                None => debug!(policy_id = %policy_id, "Dangling policy index entry"),
            }
        }

        PolicyEvaluator::sort_for_evaluation(&mut policies);
        Ok(policies)
    }

    /// Create any default policy the organization does not have yet
    ///
    /// Matching is by name, so repeated calls create nothing new.
    pub async fn seed_default_policies(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<SecurityPolicy>> {
        let existing = self.list_policies(organization_id).await?;

        let mut created = Vec::new();
        for policy in default_policies(organization_id) {
            if existing.iter().any(|p| p.name == policy.name) {
                continue;
            }
            created.push(self.create_policy(policy).await?);
        }

        if !created.is_empty() {
            info!(
                organization_id = %organization_id,
                count = created.len(),
                "Seeded default security policies"
            );
        }

        Ok(created)
    }
}

#[async_trait]
impl<S: Storage + 'static> PolicyEngine for SecurityPolicyEngine<S> {
    async fn policies_for(&self, organization_id: Uuid) -> Result<Vec<SecurityPolicy>> {
        self.list_policies(organization_id).await
    }
}
