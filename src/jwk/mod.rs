//! JSON Web Key management for token signing
//!
//! Resolves the signing key of a named key set, generating and persisting a
//! key pair the first time a set is used.
//!
//! # Architecture
//!
//! ```text
//! caller ──▶ KeyResolver ──▶ KeyManager::get_key_set
//!                 │                 │
//!                 │          private key? ──yes──▶ return it
//!                 │                 │ no
//!                 ▼                 ▼
//!            KeyGenFlight ──▶ KeyManager::generate_and_persist_key_set
//!      (one call per set+alg)       │
//!                                   ▼
//!                          find_private_key ──▶ return it
//! ```
//!
//! # Exposure
//!
//! - [`exclude_private_keys`] builds the public JWKS served to relying parties
//! - [`exclude_opaque_private_keys`] drops only non-exportable signers
//! - [`only_public_sdk_keys`] sanitizes keys handed to SDK consumers
//! - [`pem_block_for_key`] exports private keys as PEM

pub mod flight;
pub mod generate;
pub mod key;
pub mod manager;
pub mod material;
pub mod pem;
pub mod resolver;
pub mod sdk;
pub mod selector;

pub use flight::{FlightGroup, GenerationRequest, KeyGenFlight};
pub use generate::{generate_key_set, GeneratorConfig, KeyFamily, MAX_RSA_BITS, MIN_RSA_BITS};
pub use key::{CertificateInfo, JsonWebKey, KeySet, KeyUse};
pub use manager::{InMemoryKeyManager, KeyManager};
pub use material::{EcPrivateKey, EcPublicKey, KeyMaterial, OpaqueSigner, SignerPublicKey};
pub use self::pem::pem_block_for_key;
pub use resolver::KeyResolver;
pub use sdk::{only_public_sdk_keys, SdkJsonWebKey};
pub use selector::{
    exclude_opaque_private_keys, exclude_private_keys, exclude_public_keys, find_private_key,
    find_public_key, first,
};
