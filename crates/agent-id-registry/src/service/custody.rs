//! Vault custody of server-held private keys.

use crate::{errors::*, types::*};
use agent_id_crypto::{AgentKeyPair, KeyVault, PrivateKeyRecord};
use agent_id_storage::{
    column_families::CF_PRIVATE_KEYS, retry_with_backoff, BatchExt, Storage,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::AgentRegistryService;

impl<S: Storage + 'static> AgentRegistryService<S> {
    /// Decrypt the server-held key for bundle issuance
    ///
    /// The key pair lives only in memory and is zeroized on drop. Material
    /// that fails to open or does not match the registered public key is
    /// reported as corrupted and never re-sealed.
    ///
    /// Runs under the agent lock and the vault read lock, so neither a key
    /// rotation nor a master-key rotation can swap the record between the
    /// load and the open.
    pub(super) async fn issue_credentials_internal(
        &self,
        agent_id: Uuid,
    ) -> Result<(AgentIdentity, AgentKeyPair)> {
        let _guard = self.acquire(agent_id).await;
        let vault = self.vault.read().await;
        let agent = self.load_agent(agent_id).await?;

        if !agent.server_held_key {
            return Err(RegistryError::NoServerHeldKey(agent_id));
        }
        if agent.key_status != KeyStatus::Verified {
            return Err(RegistryError::InvalidKeyStatus {
                status: agent.key_status,
                reason: "credentials are only issued to verified agents".to_string(),
            });
        }

        let record: Option<PrivateKeyRecord> = retry_with_backoff(
            &self.config.retry,
            "load_private_key",
            RegistryError::is_transient,
            move || async move {
                Ok::<_, RegistryError>(self.storage.get(CF_PRIVATE_KEYS, &agent_id).await?)
            },
        )
        .await?;

        let Some(record) = record else {
            error!(agent_id = %agent_id, "Server-held key record missing");
            return Err(RegistryError::KeyMaterialCorrupted(agent_id));
        };

        let keypair = match vault.open_private_key(&record) {
            Ok(keypair) => keypair,
            Err(e) => {
                error!(
                    agent_id = %agent_id,
                    key_version = record.key_version,
                    error = %e,
                    "Stored key material failed to open; manual re-issuance required"
                );
                return Err(RegistryError::KeyMaterialCorrupted(agent_id));
            }
        };

        if keypair.public_key_bytes() != agent.public_key {
            error!(
                agent_id = %agent_id,
                "Stored key material does not match the registered public key"
            );
            return Err(RegistryError::KeyMaterialCorrupted(agent_id));
        }

        info!(agent_id = %agent_id, "Credentials issued");
        Ok((agent, keypair))
    }

    /// Re-seal every stored private key under a new master key
    ///
    /// Each record is opened and validated under the current vault before it
    /// is re-sealed. Records that fail are left untouched and listed in the
    /// report. The new vault replaces the current one only after all re-sealed
    /// records are committed in one batch.
    ///
    /// Holds the vault write lock throughout. Every other writer of
    /// private-key records holds the read lock, so the scan sees exactly the
    /// records that exist when the batch commits.
    pub async fn rotate_vault_master_key(
        &self,
        new_master_key: &[u8],
    ) -> Result<VaultRotationReport> {
        let mut vault = self.vault.write().await;
        let next = KeyVault::with_version(new_master_key, vault.version() + 1)?;

        let records: Vec<(Vec<u8>, PrivateKeyRecord)> = retry_with_backoff(
            &self.config.retry,
            "scan_private_keys",
            RegistryError::is_transient,
            move || async move {
                Ok::<_, RegistryError>(self.storage.scan_all(CF_PRIVATE_KEYS).await?)
            },
        )
        .await?;

        let mut resealed = Vec::with_capacity(records.len());
        let mut corrupted = Vec::new();
        for (_, record) in records {
            match vault.rotate_record(&record, &next) {
                Ok(new_record) => resealed.push(new_record),
                Err(e) => {
                    error!(
                        agent_id = %record.agent_id,
                        key_version = record.key_version,
                        error = %e,
                        "Key material failed to open during master-key rotation"
                    );
                    corrupted.push(record.agent_id);
                }
            }
        }

        let resealed_ref = &resealed;
        retry_with_backoff(
            &self.config.retry,
            "commit_resealed_keys",
            RegistryError::is_transient,
            move || async move {
                let mut batch = self.storage.batch();
                for record in resealed_ref {
                    batch.put(CF_PRIVATE_KEYS, &record.agent_id, record)?;
                }
                batch.commit().await?;
                Ok::<(), RegistryError>(())
            },
        )
        .await?;

        let report = VaultRotationReport {
            new_version: next.version(),
            rotated: resealed.len(),
            corrupted,
        };
        *vault = Arc::new(next);

        if report.corrupted.is_empty() {
            info!(
                new_version = report.new_version,
                rotated = report.rotated,
                "Vault master key rotated"
            );
        } else {
            warn!(
                new_version = report.new_version,
                rotated = report.rotated,
                corrupted = report.corrupted.len(),
                "Vault master key rotated with corrupted records"
            );
        }

        Ok(report)
    }
}
