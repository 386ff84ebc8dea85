//! Action verification pipeline.

use crate::{
    audit::AuditSink,
    config::{FailMode, VerificationConfig},
    errors::*,
    nonce::NonceRegistry,
    types::*,
};
use agent_id_crypto::{
    canonicalize_action_message, current_timestamp, decode_signature, verify_signature,
    SIGNATURE_SIZE,
};
use agent_id_policy::{
    ActivityTracker, EnforcementAction, FailureTracker, PolicyContext, PolicyEngine,
    PolicyEvaluator, PolicyViolation, SecurityPolicy, TrustEvent, TrustScoreEngine,
};
use agent_id_registry::{AgentIdentity, AgentRegistry};
use agent_id_storage::{retry_with_backoff, Storage};
use metrics::{counter, histogram};
use sha2::{Digest, Sha256};
use std::{sync::Arc, time::Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Decision under construction
#[derive(Default)]
struct Assessment {
    denial: Option<DenialReason>,
    violations: Vec<PolicyViolation>,
    alerts: Vec<PolicyAlert>,
    tags: Vec<String>,
    events: Vec<TrustEvent>,
}

/// Verifies signed action requests and records every decision
///
/// Each request runs under the agent's registry lock, so the idempotency
/// check, nonce claim, persistence and trust update of one agent are
/// serialized while different agents proceed in parallel.
pub struct ActionVerificationPipeline<R, P, A, S: Storage> {
    registry: Arc<R>,
    policies: Arc<P>,
    audit: Arc<A>,
    nonces: NonceRegistry<S>,
    trust: TrustScoreEngine,
    failures: FailureTracker,
    activity: ActivityTracker,
    config: VerificationConfig,
}

impl<R, P, A, S> ActionVerificationPipeline<R, P, A, S>
where
    R: AgentRegistry,
    P: PolicyEngine,
    A: AuditSink,
    S: Storage + 'static,
{
    pub fn new(
        registry: Arc<R>,
        policies: Arc<P>,
        audit: Arc<A>,
        storage: Arc<S>,
        config: VerificationConfig,
    ) -> Self {
        Self {
            registry,
            policies,
            audit,
            nonces: NonceRegistry::new(storage),
            trust: TrustScoreEngine::default(),
            failures: FailureTracker::new(config.failure_window_seconds, config.failure_threshold),
            activity: ActivityTracker::new(config.activity_horizon_seconds),
            config,
        }
    }

    /// Replace the default trust scoring parameters
    pub fn with_trust_engine(mut self, trust: TrustScoreEngine) -> Self {
        self.trust = trust;
        self
    }

    pub fn config(&self) -> &VerificationConfig {
        &self.config
    }

    pub fn trust_engine(&self) -> &TrustScoreEngine {
        &self.trust
    }

    /// Verify an action request against the current clock
    pub async fn verify(&self, request: &ActionVerificationRequest) -> Result<VerificationResult> {
        self.verify_at(request, current_timestamp()).await
    }

    /// Stored result for a verification ID
    pub async fn get_result(&self, verification_id: Uuid) -> Result<Option<VerificationResult>> {
        self.audit.find_result(verification_id).await
    }

    /// Drop nonces that can no longer pass the freshness check
    pub async fn purge_expired_nonces(&self, now: u64) -> Result<usize> {
        self.nonces.purge_expired(now).await
    }

    /// Verify an action request at time `now`
    ///
    /// Malformed requests and unknown agents are errors with no side effects.
    /// Every other request yields exactly one persisted result and audit
    /// entry. A repeated `verification_id` returns the stored result only
    /// for the identical signed request while it is still fresh; a stale
    /// repeat is denied without being persisted and a different request
    /// under a used ID is rejected.
    pub async fn verify_at(
        &self,
        request: &ActionVerificationRequest,
        now: u64,
    ) -> Result<VerificationResult> {
        let started = Instant::now();
        let signature = self.validate(request)?;

        if self.registry.find_agent(request.agent_id).await?.is_none() {
            return Err(VerificationError::UnknownAgent(request.agent_id));
        }

        let guard = self.registry.lock_agent(request.agent_id).await;
        let agent = self.registry.get_agent(request.agent_id).await?;
        let trust_before = self.trust.score_at(agent.trust_snapshot(), now);
        let digest = request_digest(request, &signature);

        if let Some(existing) = self.audit.find_result(request.verification_id).await? {
            drop(guard);
            return self.repeat_of(existing, request, &digest, trust_before, now);
        }

        let assessment = self
            .assess(&agent, request, &signature, trust_before, now)
            .await?;

        let update = (!assessment.events.is_empty())
            .then(|| self.trust.apply_all(agent.trust_snapshot(), &assessment.events, now));
        let trust_after = update.map(|u| u.after).unwrap_or(trust_before);

        let status = match assessment.denial {
            None => VerificationStatus::Approved,
            Some(_) => VerificationStatus::Denied,
        };

        let result = VerificationResult {
            verification_id: request.verification_id,
            agent_id: agent.agent_id,
            organization_id: agent.organization_id,
            action_type: request.action_type.clone(),
            resource: request.resource.clone(),
            risk_level: request.risk_level,
            status,
            denial_reason: assessment.denial,
            alerted: status == VerificationStatus::Approved && !assessment.alerts.is_empty(),
            trust_score_before: trust_before,
            trust_score_after: trust_after,
            policy_violations: assessment.violations,
            timestamp: now,
            duration_ms: started.elapsed().as_millis() as u64,
            request_digest: digest,
        };

        let entry = AuditEntry {
            entry_id: Uuid::new_v4(),
            verification_id: result.verification_id,
            actor: agent.agent_id,
            organization_id: agent.organization_id,
            action: result.action_type.clone(),
            resource: result.resource.clone(),
            risk_level: result.risk_level,
            status,
            denial_reason: result.denial_reason,
            tags: assessment.tags,
            timestamp: now,
        };

        let result_ref = &result;
        let entry_ref = &entry;
        let alerts_ref = &assessment.alerts;
        retry_with_backoff(
            &self.config.retry,
            "persist_verification",
            VerificationError::is_transient,
            move || async move { self.audit.persist(result_ref, entry_ref, alerts_ref).await },
        )
        .await?;

        if let Some(update) = update {
            let verified_at = result.is_approved().then_some(now);
            self.registry
                .record_trust_update(
                    &guard,
                    update,
                    &assessment.events,
                    Some(result.verification_id),
                    verified_at,
                )
                .await?;
        }
        drop(guard);

        if result.is_approved() {
            self.failures.reset(agent.agent_id);
        }

        self.record_metrics(&result, started);
        match result.denial_reason {
            None => info!(
                verification_id = %result.verification_id,
                agent_id = %result.agent_id,
                action = %result.action_type,
                risk_level = result.risk_level.as_str(),
                alerted = result.alerted,
                trust_score = result.trust_score_after,
                "Action approved"
            ),
            Some(reason) => warn!(
                verification_id = %result.verification_id,
                agent_id = %result.agent_id,
                action = %result.action_type,
                risk_level = result.risk_level.as_str(),
                reason = reason.as_str(),
                trust_score = result.trust_score_after,
                "Action denied"
            ),
        }

        Ok(result)
    }

    /// Answer a request whose `verification_id` already has a stored result
    fn repeat_of(
        &self,
        existing: VerificationResult,
        request: &ActionVerificationRequest,
        digest: &str,
        trust_score: f64,
        now: u64,
    ) -> Result<VerificationResult> {
        if existing.agent_id != request.agent_id || existing.request_digest != digest {
            warn!(
                verification_id = %request.verification_id,
                agent_id = %request.agent_id,
                "Verification ID reused for a different request"
            );
            return Err(VerificationError::InvalidRequest(format!(
                "verification_id {} was used for a different request",
                request.verification_id
            )));
        }

        if now.abs_diff(request.timestamp) > self.config.freshness_window_seconds {
            warn!(
                verification_id = %request.verification_id,
                agent_id = %request.agent_id,
                "Repeated request is outside the freshness window"
            );
            return Ok(VerificationResult {
                status: VerificationStatus::Denied,
                denial_reason: Some(DenialReason::StaleRequest),
                alerted: false,
                trust_score_before: trust_score,
                trust_score_after: trust_score,
                policy_violations: Vec::new(),
                timestamp: now,
                duration_ms: 0,
                ..existing
            });
        }

        debug!(
            verification_id = %request.verification_id,
            "Returning stored verification result"
        );
        Ok(existing)
    }

    fn validate(&self, request: &ActionVerificationRequest) -> Result<[u8; SIGNATURE_SIZE]> {
        if request.action_type.trim().is_empty() {
            return Err(VerificationError::InvalidRequest(
                "action_type must not be empty".to_string(),
            ));
        }
        if request.nonce.is_empty() {
            return Err(VerificationError::InvalidRequest(
                "nonce must not be empty".to_string(),
            ));
        }
        if request.nonce.len() > self.config.max_nonce_length {
            return Err(VerificationError::InvalidRequest(format!(
                "nonce exceeds {} bytes",
                self.config.max_nonce_length
            )));
        }
        decode_signature(&request.signature)
            .map_err(|e| VerificationError::InvalidRequest(format!("signature: {}", e)))
    }

    async fn assess(
        &self,
        agent: &AgentIdentity,
        request: &ActionVerificationRequest,
        signature: &[u8; SIGNATURE_SIZE],
        trust_score: f64,
        now: u64,
    ) -> Result<Assessment> {
        let mut assessment = Assessment::default();
        let risk_level = request.risk_level;

        if !agent.key_status.can_act() {
            assessment.denial = Some(DenialReason::AgentSuspended);
            assessment
                .tags
                .push(format!("key_status:{}", agent.key_status.as_str()));
            return Ok(assessment);
        }

        if let Some(reason) = self
            .authenticate(agent, request, signature, &mut assessment.tags, now)
            .await?
        {
            assessment.denial = Some(reason);
            if self.failures.record_failure(agent.agent_id, now) {
                warn!(
                    agent_id = %agent.agent_id,
                    threshold = self.config.failure_threshold,
                    window_seconds = self.config.failure_window_seconds,
                    "Repeated authentication failures"
                );
                assessment.events.push(TrustEvent::RepeatedAuthFailures);
            }
            return Ok(assessment);
        }

        let context = PolicyContext {
            agent_id: agent.agent_id,
            organization_id: agent.organization_id,
            action_type: request.action_type.clone(),
            resource: request.resource.clone(),
            risk_level,
            trust_score,
            capabilities: agent.capabilities.clone(),
            recent_actions: self.activity.record(agent.agent_id, now),
            timestamp: now,
        };

        let policies = match self.load_policies(agent.organization_id).await {
            Some(policies) => policies,
            None => {
                assessment.tags.push("policy_check:unavailable".to_string());
                match self.config.fail_modes.for_level(risk_level) {
                    FailMode::Closed => {
                        assessment.denial = Some(DenialReason::PolicyUnavailable);
                        assessment.alerts.push(self.alert(
                            agent,
                            request,
                            None,
                            "Policy check unavailable; request failed closed".to_string(),
                            true,
                            now,
                        ));
                        return Ok(assessment);
                    }
                    FailMode::Open => {
                        assessment.alerts.push(self.alert(
                            agent,
                            request,
                            None,
                            "Policy check unavailable; request failed open".to_string(),
                            false,
                            now,
                        ));
                        Vec::new()
                    }
                }
            }
        };

        let evaluation = PolicyEvaluator::evaluate(&policies, &context);
        if evaluation.is_blocked() {
            assessment.denial = Some(DenialReason::PolicyViolation);
        }

        // Trust gate: a below-threshold score blocks unless the governing
        // low-trust policy only observes.
        let mut gate_blocks = None;
        let threshold = self.config.thresholds.for_level(risk_level);
        if trust_score < threshold {
            assessment.tags.push("trust:below_threshold".to_string());
            let governing = PolicyEvaluator::governing_low_trust_policy(&policies, &context);
            let observe_only =
                governing.is_some_and(|p| p.enforcement_action == EnforcementAction::AlertOnly);
            if !observe_only {
                assessment.denial = Some(DenialReason::InsufficientTrust);
                gate_blocks = Some(governing.map(|p| p.policy_id));
            }

            // A governing policy that matched on its own is alerted below
            let reported = governing
                .is_some_and(|p| evaluation.violations.iter().any(|v| v.policy_id == p.policy_id));
            if !reported {
                let message = format!(
                    "Trust score {:.1} is below {:.1} required for {} risk",
                    trust_score,
                    threshold,
                    risk_level.as_str()
                );
                assessment.alerts.push(self.alert(
                    agent,
                    request,
                    governing,
                    message,
                    !observe_only,
                    now,
                ));
            }
        }

        let blocked_by = match (assessment.denial, gate_blocks) {
            (Some(DenialReason::PolicyViolation), _) => evaluation.blocked_by,
            (Some(DenialReason::InsufficientTrust), Some(governing)) => governing,
            _ => None,
        };
        for violation in &evaluation.violations {
            assessment.alerts.push(PolicyAlert {
                alert_id: Uuid::new_v4(),
                organization_id: agent.organization_id,
                agent_id: agent.agent_id,
                verification_id: request.verification_id,
                policy_id: Some(violation.policy_id),
                policy_name: Some(violation.policy_name.clone()),
                message: violation.message.clone(),
                blocking: blocked_by == Some(violation.policy_id),
                timestamp: now,
            });
        }
        assessment.tags.extend(evaluation.audit_tags);
        assessment.violations = evaluation.violations;

        assessment.events.push(match assessment.denial {
            None => TrustEvent::Approved { risk_level },
            Some(_) => TrustEvent::Denied { risk_level },
        });
        if !assessment.violations.is_empty() {
            assessment.events.push(TrustEvent::PolicyViolations {
                risk_level,
                count: assessment.violations.len() as u32,
            });
        }

        Ok(assessment)
    }

    /// Signature, freshness and nonce checks; `Some` carries the denial
    async fn authenticate(
        &self,
        agent: &AgentIdentity,
        request: &ActionVerificationRequest,
        signature: &[u8; SIGNATURE_SIZE],
        tags: &mut Vec<String>,
        now: u64,
    ) -> Result<Option<DenialReason>> {
        let message = canonicalize_action_message(
            &agent.agent_id,
            request.timestamp,
            &request.nonce,
            &request.action_type,
            &request.resource,
        );

        let signed_with = agent
            .verification_keys(now)
            .iter()
            .position(|key| verify_signature(key, &message, signature).is_ok());
        match signed_with {
            None => return Ok(Some(DenialReason::InvalidSignature)),
            Some(0) if now >= agent.key_expires_at => {
                tags.push("key:expired".to_string());
                return Ok(Some(DenialReason::InvalidSignature));
            }
            Some(0) => {}
            Some(_) => tags.push("signed_with:grace_key".to_string()),
        }

        let window = self.config.freshness_window_seconds;
        if now.abs_diff(request.timestamp) > window {
            return Ok(Some(DenialReason::StaleRequest));
        }

        // Past this point the freshness check rejects the nonce on its own
        let expires_at = request.timestamp.saturating_add(window);
        let agent_id = agent.agent_id;
        let nonce = request.nonce.as_str();
        let claimed = retry_with_backoff(
            &self.config.retry,
            "claim_nonce",
            VerificationError::is_transient,
            move || async move { self.nonces.claim(agent_id, nonce, expires_at).await },
        )
        .await?;
        if !claimed {
            return Ok(Some(DenialReason::ReplayedNonce));
        }

        Ok(None)
    }

    /// Policies of the organization, `None` when they could not be loaded in time
    async fn load_policies(&self, organization_id: Uuid) -> Option<Vec<SecurityPolicy>> {
        let limit = self.config.remote_check_timeout;
        match timeout(limit, self.policies.policies_for(organization_id)).await {
            Ok(Ok(policies)) => Some(policies),
            Ok(Err(e)) => {
                warn!(organization_id = %organization_id, error = %e, "Policy lookup failed");
                None
            }
            Err(_) => {
                warn!(
                    organization_id = %organization_id,
                    timeout_ms = limit.as_millis() as u64,
                    "Policy lookup timed out"
                );
                None
            }
        }
    }

    fn alert(
        &self,
        agent: &AgentIdentity,
        request: &ActionVerificationRequest,
        policy: Option<&SecurityPolicy>,
        message: String,
        blocking: bool,
        now: u64,
    ) -> PolicyAlert {
        PolicyAlert {
            alert_id: Uuid::new_v4(),
            organization_id: agent.organization_id,
            agent_id: agent.agent_id,
            verification_id: request.verification_id,
            policy_id: policy.map(|p| p.policy_id),
            policy_name: policy.map(|p| p.name.clone()),
            message,
            blocking,
            timestamp: now,
        }
    }

    fn record_metrics(&self, result: &VerificationResult, started: Instant) {
        counter!(
            "agent_verifications_total",
            "status" => result.status.as_str(),
            "risk_level" => result.risk_level.as_str(),
            "reason" => result.denial_reason.map(|r| r.as_str()).unwrap_or("none")
        )
        .increment(1);
        histogram!("agent_verification_duration_seconds").record(started.elapsed().as_secs_f64());
    }
}

/// Hex SHA-256 binding a request's signed content and risk level
fn request_digest(
    request: &ActionVerificationRequest,
    signature: &[u8; SIGNATURE_SIZE],
) -> String {
    let message = canonicalize_action_message(
        &request.agent_id,
        request.timestamp,
        &request.nonce,
        &request.action_type,
        &request.resource,
    );
    let mut hasher = Sha256::new();
    hasher.update(&message);
    hasher.update(signature);
    hasher.update(request.risk_level.as_str().as_bytes());
    hex::encode(hasher.finalize())
}
