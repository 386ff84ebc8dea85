//! # agent-id-policy
//!
//! Declarative security policies evaluated per verification event, and the
//! bounded trust score that gates risk-sensitive actions.

#![warn(clippy::all)]

pub mod engine;
pub mod errors;
pub mod evaluator;
pub mod tracking;
pub mod trust;
pub mod types;

pub use engine::{default_policies, PolicyEngine, SecurityPolicyEngine};
pub use errors::{PolicyError, Result};
pub use evaluator::PolicyEvaluator;
pub use tracking::{ActivityTracker, FailureTracker};
pub use trust::{TrustConfig, TrustEvent, TrustScoreEngine, TrustSnapshot, TrustUpdate};
pub use types::*;
