/*!
 * CLI command implementations
 */

pub mod actions;
pub mod keys;

use agent_id_sdk::{CredentialBundle, HttpBackend, KeyRotationAgent, RotationConfig};
use anyhow::{Context as _, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// Options shared by every command
pub struct Context {
    pub bundle_path: PathBuf,
    pub server: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl Context {
    pub fn load_bundle(&self) -> Result<CredentialBundle> {
        CredentialBundle::load(&self.bundle_path)
            .with_context(|| format!("Failed to load bundle {}", self.bundle_path.display()))
    }

    pub fn backend(&self, bundle: &CredentialBundle) -> Result<Arc<HttpBackend>> {
        let url = self
            .server
            .clone()
            .unwrap_or_else(|| bundle.backend_url.clone());
        let backend = HttpBackend::new(url)?
            .with_tokens(self.access_token.clone(), self.refresh_token.clone());
        Ok(Arc::new(backend))
    }

    pub fn agent(&self, config: RotationConfig) -> Result<Arc<KeyRotationAgent<HttpBackend>>> {
        let bundle = self.load_bundle()?;
        let backend = self.backend(&bundle)?;
        let agent = KeyRotationAgent::load(backend, &self.bundle_path, config)
            .context("Failed to start rotation agent")?;
        Ok(Arc::new(agent))
    }
}
