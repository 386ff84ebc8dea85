//! # agent-id-tokens
//!
//! HS256 tokens for humans and agents. Three classes are issued from one
//! signing secret: access, interactive refresh and SDK-embedded refresh. The
//! issuer claim records the class so rotation can preserve it.

pub mod errors;
pub mod revocation;
mod service;
pub mod types;


pub use errors::*;
pub use revocation::RevocationList;
pub use service::TokenService;
pub use types::*;
