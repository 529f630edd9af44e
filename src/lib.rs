//! Doorway JWK - signing key resolution for Doorway
//!
//! Provides get-or-generate resolution of JSON Web Keys with coalesced key
//! generation, plus the selection and sanitization helpers used whenever
//! keys are exposed outside the process.

pub mod config;
pub mod jwk;
pub mod types;

pub use config::Args;
pub use jwk::{KeyResolver, KeySet, JsonWebKey};
pub use types::{JwkError, Result};
