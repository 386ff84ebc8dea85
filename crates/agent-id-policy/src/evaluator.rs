//! Policy evaluator logic.

use crate::types::*;
use std::cmp::Ordering;
use tracing::warn;

/// Capability granting every action type
pub const WILDCARD_CAPABILITY: &str = "*";

/// Policy evaluator for verification events
pub struct PolicyEvaluator;

impl PolicyEvaluator {
    /// Order policies for evaluation: descending priority, then creation order
    pub fn sort_for_evaluation(policies: &mut [SecurityPolicy]) {
        policies.sort_by(|a, b| match b.priority.cmp(&a.priority) {
            Ordering::Equal => a.sequence.cmp(&b.sequence),
            other => other,
        });
    }

    /// Evaluate every enabled policy that covers the request
    ///
    /// Policies run in descending priority with creation-order tiebreak. The
    /// first matching `BlockAndAlert` policy decides the outcome; evaluation
    /// still continues so that every matching policy is logged as an alert.
    pub fn evaluate(policies: &[SecurityPolicy], context: &PolicyContext) -> PolicyEvaluation {
        let mut applicable: Vec<SecurityPolicy> = policies
            .iter()
            .filter(|p| p.applies_to(context.organization_id, context.risk_level))
            .cloned()
            .collect();
        Self::sort_for_evaluation(&mut applicable);

        let mut evaluation = PolicyEvaluation {
            audit_tags: vec![
                format!("action_type:{}", context.action_type),
                format!("risk_level:{}", context.risk_level.as_str()),
                format!("policies_evaluated:{}", applicable.len()),
            ],
            ..Default::default()
        };

        for policy in &applicable {
            let Some(message) = Self::check_rule(&policy.rule, context) else {
                continue;
            };

            let violation = PolicyViolation {
                policy_id: policy.policy_id,
                policy_name: policy.name.clone(),
                policy_type: policy.policy_type(),
                enforcement_action: policy.enforcement_action,
                priority: policy.priority,
                message,
            };

            let decisive = violation.is_blocking() && evaluation.blocked_by.is_none();
            if decisive {
                evaluation.blocked_by = Some(policy.policy_id);
                evaluation
                    .audit_tags
                    .push(format!("blocked_by:{}", policy.name));
            }

            warn!(
                agent_id = %context.agent_id,
                policy_id = %policy.policy_id,
                policy = %policy.name,
                enforcement = ?policy.enforcement_action,
                decisive,
                reason = %violation.message,
                "Security policy matched"
            );

            evaluation
                .audit_tags
                .push(format!("violation:{:?}", violation.policy_type));
            evaluation.violations.push(violation);
        }

        evaluation
    }

    /// The highest-ordered enabled low-trust policy covering the request
    ///
    /// Its enforcement action decides whether a below-threshold trust score
    /// blocks the request or only raises an alert.
    pub fn governing_low_trust_policy<'a>(
        policies: &'a [SecurityPolicy],
        context: &PolicyContext,
    ) -> Option<&'a SecurityPolicy> {
        policies
            .iter()
            .filter(|p| p.policy_type() == PolicyType::LowTrustScore)
            .filter(|p| p.applies_to(context.organization_id, context.risk_level))
            .min_by(|a, b| match b.priority.cmp(&a.priority) {
                Ordering::Equal => a.sequence.cmp(&b.sequence),
                other => other,
            })
    }

    /// Returns a human-readable reason when the rule matches
    fn check_rule(rule: &PolicyRule, context: &PolicyContext) -> Option<String> {
        match rule {
            PolicyRule::CapabilityViolation => {
                let granted = context.capabilities.contains(&context.action_type)
                    || context.capabilities.contains(WILDCARD_CAPABILITY);
                (!granted).then(|| {
                    format!(
                        "Action '{}' is not in the agent's capabilities",
                        context.action_type
                    )
                })
            }
            PolicyRule::LowTrustScore { min_score } => (context.trust_score < *min_score).then(|| {
                format!(
                    "Trust score {:.1} is below {:.1}",
                    context.trust_score, min_score
                )
            }),
            PolicyRule::UnusualActivity {
                max_actions,
                window_seconds,
            } => {
                let count = context.actions_within(*window_seconds);
                (count > *max_actions).then(|| {
                    format!(
                        "{} actions in {}s exceeds {}",
                        count, window_seconds, max_actions
                    )
                })
            }
            PolicyRule::RestrictedResource { prefixes } => prefixes
                .iter()
                .find(|prefix| context.resource.starts_with(prefix.as_str()))
                .map(|prefix| {
                    format!("Resource '{}' is restricted ({})", context.resource, prefix)
                }),
        }
    }
}
