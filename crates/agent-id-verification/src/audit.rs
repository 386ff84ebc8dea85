//! Persistence of verification results, audit entries and policy alerts.

use crate::{errors::*, types::*};
use agent_id_storage::{
    column_families::{CF_AUDIT_LOG, CF_POLICY_ALERTS, CF_VERIFICATIONS},
    BatchExt, Storage,
};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Sink for verification decisions
///
/// `persist` must write the result, its audit entry and its alerts
/// atomically: either all are stored or none are.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Previously stored result for an idempotency key
    async fn find_result(&self, verification_id: Uuid) -> Result<Option<VerificationResult>>;

    /// Store one decision
    async fn persist(
        &self,
        result: &VerificationResult,
        entry: &AuditEntry,
        alerts: &[PolicyAlert],
    ) -> Result<()>;
}

/// Audit sink backed by the shared storage
pub struct StorageAuditSink<S: Storage> {
    storage: Arc<S>,
}

impl<S: Storage + 'static> StorageAuditSink<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Audit entries of an agent, oldest first
    pub async fn audit_entries(&self, agent_id: Uuid) -> Result<Vec<AuditEntry>> {
        let entries: Vec<(Vec<u8>, AuditEntry)> =
            self.storage.get_by_prefix(CF_AUDIT_LOG, &agent_id).await?;

        let mut entries: Vec<AuditEntry> = entries.into_iter().map(|(_, entry)| entry).collect();
        entries.sort_by_key(|entry| entry.timestamp);
        Ok(entries)
    }

    /// Policy alerts of an organization, oldest first
    pub async fn alerts(&self, organization_id: Uuid) -> Result<Vec<PolicyAlert>> {
        let alerts: Vec<(Vec<u8>, PolicyAlert)> = self
            .storage
            .get_by_prefix(CF_POLICY_ALERTS, &organization_id)
            .await?;

        let mut alerts: Vec<PolicyAlert> = alerts.into_iter().map(|(_, alert)| alert).collect();
        alerts.sort_by_key(|alert| alert.timestamp);
        Ok(alerts)
    }
}

#[async_trait]
impl<S: Storage + 'static> AuditSink for StorageAuditSink<S> {
    async fn find_result(&self, verification_id: Uuid) -> Result<Option<VerificationResult>> {
        Ok(self.storage.get(CF_VERIFICATIONS, &verification_id).await?)
    }

    async fn persist(
        &self,
        result: &VerificationResult,
        entry: &AuditEntry,
        alerts: &[PolicyAlert],
    ) -> Result<()> {
        let mut batch = self.storage.batch();
        batch.put(CF_VERIFICATIONS, &result.verification_id, result)?;
        batch.put(CF_AUDIT_LOG, &(entry.actor, entry.entry_id), entry)?;
        for alert in alerts {
            batch.put(
                CF_POLICY_ALERTS,
                &(alert.organization_id, alert.alert_id),
                alert,
            )?;
        }
        batch.commit().await?;
        Ok(())
    }
}
