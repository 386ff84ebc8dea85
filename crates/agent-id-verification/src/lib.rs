//! # agent-id-verification
//!
//! Verification of signed agent action requests.
//!
//! Every request that reaches a decision produces one immutable
//! [`VerificationResult`] and one [`AuditEntry`]. Signatures are checked
//! against the agent's current key, or its previous key inside the
//! post-rotation grace window. Nonces are single-use per agent. Approval is
//! gated by the agent's trust score and the organization's security policies.

#![warn(clippy::all)]

pub mod audit;
pub mod config;
pub mod errors;
pub mod nonce;
pub mod pipeline;
pub mod types;

pub use audit::{AuditSink, StorageAuditSink};
pub use config::{FailMode, FailModes, TrustThresholds, VerificationConfig};
pub use errors::{Result, VerificationError};
pub use nonce::NonceRegistry;
pub use pipeline::ActionVerificationPipeline;
pub use types::*;
