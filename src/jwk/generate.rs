//! Key pair generation for JOSE signing algorithms.
//!
//! | `alg`                 | Key                      |
//! |-----------------------|--------------------------|
//! | `RS*`, `PS*`          | RSA, `rsa_bits` modulus  |
//! | `ES256`               | P-256                    |
//! | `ES384`               | P-384                    |
//! | `EdDSA`               | Ed25519                  |
//!
//! Uses the OS cryptographically secure random number generator. RSA
//! generation is CPU bound; async callers should run it on a blocking thread.

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use tracing::debug;
use uuid::Uuid;

use crate::types::{JwkError, Result};

use super::key::{JsonWebKey, KeySet, KeyUse};
use super::material::{EcPrivateKey, KeyMaterial};

/// Default RSA modulus size in bits
pub const DEFAULT_RSA_BITS: usize = 4096;

/// Smallest RSA modulus accepted for signing keys
pub const MIN_RSA_BITS: usize = 2048;

/// Largest RSA modulus generated or decoded
pub const MAX_RSA_BITS: usize = 16384;

/// Key generation settings.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// RSA modulus size for `RS*`/`PS*` keys
    pub rsa_bits: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            rsa_bits: DEFAULT_RSA_BITS,
        }
    }
}

/// Key family an algorithm maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Rsa,
    P256,
    P384,
    Ed25519,
}

impl KeyFamily {
    pub fn for_alg(alg: &str) -> Result<Self> {
        match alg {
            "RS256" | "RS384" | "RS512" | "PS256" | "PS384" | "PS512" => Ok(Self::Rsa),
            "ES256" => Ok(Self::P256),
            "ES384" => Ok(Self::P384),
            "EdDSA" => Ok(Self::Ed25519),
            other => Err(JwkError::UnsupportedAlgorithm(format!(
                "cannot generate keys for '{other}'"
            ))),
        }
    }
}

/// Generate a fresh key set holding one private key.
///
/// An empty `kid` is replaced with a random UUID.
pub fn generate_key_set(
    set: &str,
    kid: &str,
    alg: &str,
    key_use: KeyUse,
    config: &GeneratorConfig,
) -> Result<KeySet> {
    let family = KeyFamily::for_alg(alg)?;

    let material = match family {
        KeyFamily::Rsa => {
            if !(MIN_RSA_BITS..=MAX_RSA_BITS).contains(&config.rsa_bits) {
                return Err(JwkError::generation(
                    set,
                    alg,
                    format!("RSA keys must be {MIN_RSA_BITS} to {MAX_RSA_BITS} bits"),
                ));
            }
            let key = RsaPrivateKey::new(&mut OsRng, config.rsa_bits)
                .map_err(|e| JwkError::generation(set, alg, e))?;
            KeyMaterial::RsaPrivate(key)
        }
        KeyFamily::P256 => KeyMaterial::EcPrivate(EcPrivateKey::P256(p256::SecretKey::random(&mut OsRng))),
        KeyFamily::P384 => KeyMaterial::EcPrivate(EcPrivateKey::P384(p384::SecretKey::random(&mut OsRng))),
        KeyFamily::Ed25519 => KeyMaterial::Ed25519Private(SigningKey::generate(&mut OsRng)),
    };

    let kid = if kid.is_empty() {
        Uuid::new_v4().to_string()
    } else {
        kid.to_string()
    };

    debug!(jwks = %set, kid = %kid, alg = %alg, "Generated new key pair");

    Ok(KeySet::new(vec![JsonWebKey::new(kid, Some(key_use), alg, material)]))
}
