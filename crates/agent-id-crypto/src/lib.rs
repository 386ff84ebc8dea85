//! # agent-id-crypto
//!
//! Cryptographic primitives for agent identities.
//!
//! ## Security Properties
//!
//! - Agent private keys are zeroized when dropped
//! - Signatures are verified with strict Ed25519 checks
//! - Vault ciphertexts are authenticated and bound to the owning agent
//! - No unsafe code

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod constants;
pub mod errors;
pub mod keys;
pub mod signatures;
pub mod utils;
pub mod vault;

pub use constants::*;
pub use errors::{CryptoError, Result};
pub use keys::*;
pub use signatures::*;
pub use utils::current_timestamp;
pub use vault::{KeyVault, PrivateKeyRecord};
