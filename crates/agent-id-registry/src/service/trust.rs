//! Trust score persistence and history.

use crate::{errors::*, traits::AgentGuard, types::*};
use agent_id_policy::{TrustEvent, TrustScoreEngine, TrustSnapshot, TrustUpdate};
use agent_id_storage::{
    column_families::{CF_AGENTS, CF_TRUST_EVENTS},
    retry_with_backoff, BatchExt, Storage,
};
use tracing::debug;
use uuid::Uuid;

use super::AgentRegistryService;

const TRUST_EVENT_SEQUENCE: &str = "trust_events";

impl<S: Storage + 'static> AgentRegistryService<S> {
    pub(super) async fn record_trust_update_internal(
        &self,
        guard: &AgentGuard,
        update: TrustUpdate,
        events: &[TrustEvent],
        verification_id: Option<Uuid>,
        verified_at: Option<u64>,
    ) -> Result<AgentIdentity> {
        let agent_id = guard.agent_id();
        let mut agent = self.load_agent(agent_id).await?;

        agent.trust_score = update.after.clamp(0.0, 100.0);
        agent.trust_updated_at = update.updated_at;
        if verified_at.is_some() {
            agent.last_verified_at = verified_at;
        }

        let mut history = Vec::with_capacity(events.len());
        for event in events {
            history.push(TrustEventRecord {
                agent_id,
                sequence: self.storage.next_sequence(TRUST_EVENT_SEQUENCE).await?,
                event: *event,
                verification_id,
                score_before: update.before,
                score_after: agent.trust_score,
                timestamp: update.updated_at,
            });
        }

        let agent_ref = &agent;
        let history_ref = &history;
        retry_with_backoff(
            &self.config.retry,
            "record_trust_update",
            RegistryError::is_transient,
            move || async move {
                let mut batch = self.storage.batch();
                batch.put(CF_AGENTS, &agent_ref.agent_id, agent_ref)?;
                for record in history_ref {
                    batch.put(CF_TRUST_EVENTS, &(record.agent_id, record.sequence), record)?;
                }
                batch.commit().await?;
                Ok::<(), RegistryError>(())
            },
        )
        .await?;

        debug!(
            agent_id = %agent_id,
            before = update.before,
            after = agent.trust_score,
            "Trust score updated"
        );

        Ok(agent)
    }

    /// Trust events of an agent, oldest first
    pub async fn trust_history(&self, agent_id: Uuid) -> Result<Vec<TrustEventRecord>> {
        let entries: Vec<(Vec<u8>, TrustEventRecord)> = self
            .storage
            .get_by_prefix(CF_TRUST_EVENTS, &agent_id)
            .await?;

        let mut history: Vec<TrustEventRecord> =
            entries.into_iter().map(|(_, record)| record).collect();
        history.sort_by_key(|record| record.sequence);
        Ok(history)
    }

    /// Recompute an agent's score from its full history at time `now`
    pub async fn recompute_trust_score(
        &self,
        agent_id: Uuid,
        engine: &TrustScoreEngine,
        now: u64,
    ) -> Result<f64> {
        let agent = self.load_agent(agent_id).await?;
        let history: Vec<(u64, TrustEvent)> = self
            .trust_history(agent_id)
            .await?
            .into_iter()
            .map(|record| (record.timestamp, record.event))
            .collect();

        let start = TrustSnapshot {
            score: self.config.initial_trust_score,
            updated_at: agent.created_at,
        };
        Ok(engine.score_from_history(start, &history, now))
    }
}
