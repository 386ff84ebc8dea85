use agent_id_crypto::KeyVault;
use agent_id_policy::SecurityPolicyEngine;
use agent_id_registry::AgentRegistryService;
use agent_id_storage::RocksDbStorage;
use agent_id_tokens::{RevocationList, TokenService};
use agent_id_verification::{ActionVerificationPipeline, StorageAuditSink};
use anyhow::Result;
use std::sync::Arc;

use crate::config::Config;

pub type Registry = AgentRegistryService<RocksDbStorage>;
pub type Policies = SecurityPolicyEngine<RocksDbStorage>;
pub type AuditLog = StorageAuditSink<RocksDbStorage>;
pub type Pipeline = ActionVerificationPipeline<Registry, Policies, AuditLog, RocksDbStorage>;

/// Application state shared across all handlers
pub struct AppState {
    pub config: Config,
    pub storage: Arc<RocksDbStorage>,
    pub registry: Arc<Registry>,
    pub policies: Arc<Policies>,
    pub audit: Arc<AuditLog>,
    pub pipeline: Arc<Pipeline>,
    pub tokens: Arc<TokenService>,
    pub revocations: Arc<RevocationList<RocksDbStorage>>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let storage = Arc::new(RocksDbStorage::open(&config.database_path)?);
        Self::with_storage(config, storage)
    }

    /// Build services over an already opened database
    pub fn with_storage(config: Config, storage: Arc<RocksDbStorage>) -> Result<Self> {
        let vault = KeyVault::new(config.vault_master_key.as_slice())?;
        let token_config = config.token_config();
        let leeway = token_config.leeway;
        let tokens = Arc::new(TokenService::new(token_config)?);

        let registry = Arc::new(AgentRegistryService::new(
            storage.clone(),
            vault,
            config.registry_config(),
        ));
        let policies = Arc::new(SecurityPolicyEngine::new(storage.clone()));
        let audit = Arc::new(StorageAuditSink::new(storage.clone()));
        let pipeline = Arc::new(ActionVerificationPipeline::new(
            registry.clone(),
            policies.clone(),
            audit.clone(),
            storage.clone(),
            config.verification_config(),
        ));
        let revocations = Arc::new(RevocationList::new(storage.clone()).with_leeway(leeway));

        Ok(AppState {
            config,
            storage,
            registry,
            policies,
            audit,
            pipeline,
            tokens,
            revocations,
        })
    }
}
