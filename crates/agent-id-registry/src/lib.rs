//! # agent-id-registry
//!
//! Agent identities and their key lifecycle: registration with proof of
//! possession, key status and rotation with a grace window, suspension and
//! revocation, and vault custody of server-generated private keys.

#![warn(clippy::all)]

pub mod errors;
mod service;
pub mod traits;
pub mod types;

#[cfg(test)]
mod tests;

pub use errors::*;
pub use service::AgentRegistryService;
pub use traits::*;
pub use types::*;
