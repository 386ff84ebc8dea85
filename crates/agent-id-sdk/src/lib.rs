//! # agent-id-sdk
//!
//! Agent-side half of agent-id: loads the credential bundle, signs action
//! requests, and keeps the agent's key rotated before it expires.
//!
//! ```no_run
//! use agent_id_sdk::{HttpBackend, KeyRotationAgent, RotationConfig};
//! use std::{sync::Arc, time::Duration};
//!
//! # async fn run() -> agent_id_sdk::Result<()> {
//! let backend = Arc::new(
//!     HttpBackend::new("https://agents.example.com")?
//!         .with_tokens(Some("access".into()), Some("refresh".into())),
//! );
//! let agent = Arc::new(KeyRotationAgent::load(
//!     backend.clone(),
//!     "agent-credentials.json",
//!     RotationConfig::default(),
//! )?);
//! agent.reconcile().await?;
//!
//! let signer = agent.signer();
//! let handle = agent.clone().spawn();
//!
//! let request = signer.sign_action("read", "reports/q3", "low", serde_json::Value::Null);
//! let outcome = backend.verify_action(&request).await?;
//! println!("{}", outcome.status);
//!
//! handle.shutdown(Duration::from_secs(5)).await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod backend;
pub mod bundle;
pub mod errors;
pub mod rotation;
pub mod signing;

pub use backend::{
    HttpBackend, KeyBackend, KeyStatusReport, RotationAck, RotationSubmission, VerificationOutcome,
};
pub use bundle::{CredentialBundle, PendingKey};
pub use errors::{Result, SdkError};
pub use rotation::{
    KeyRotationAgent, ReconcileOutcome, RotationConfig, RotationEvent, RotationHandle,
    RotationState,
};
pub use signing::{SignedActionRequest, SigningHandle};
