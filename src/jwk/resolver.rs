//! Get-or-generate resolution of signing keys.
//!
//! Resolution order:
//! 1. Load the stored set. "Not found" counts as an empty set.
//! 2. Return the first private key if the set has one.
//! 3. Otherwise generate and persist a key pair, coalesced per
//!    `(set, alg)` through the [`KeyGenFlight`].
//! 4. Return the first private key of the generated set.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::types::{JwkError, Result};

use super::flight::{GenerationRequest, KeyGenFlight};
use super::key::{JsonWebKey, KeySet, KeyUse};
use super::manager::KeyManager;
use super::selector::find_private_key;

/// Resolves signing keys, generating a key pair when a set has none.
pub struct KeyResolver<M: KeyManager> {
    manager: Arc<M>,
    flight: Arc<KeyGenFlight>,
}

impl<M: KeyManager> Clone for KeyResolver<M> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
            flight: self.flight.clone(),
        }
    }
}

impl<M: KeyManager> KeyResolver<M> {
    /// Create a resolver. Resolvers sharing one `flight` coalesce generation
    /// with each other.
    pub fn new(manager: Arc<M>, flight: Arc<KeyGenFlight>) -> Self {
        Self { manager, flight }
    }

    /// Create a resolver with its own coalescing group.
    pub fn with_manager(manager: Arc<M>) -> Self {
        Self::new(manager, Arc::new(KeyGenFlight::new()))
    }

    pub fn manager(&self) -> &Arc<M> {
        &self.manager
    }

    pub fn flight(&self) -> &Arc<KeyGenFlight> {
        &self.flight
    }

    /// Return the first private key of `set`, generating and persisting a
    /// `kid`/`alg` signing key pair if the set has none.
    pub async fn get_or_generate_keys(&self, set: &str, kid: &str, alg: &str) -> Result<JsonWebKey> {
        let keys = match self.manager.get_key_set(set).await {
            Ok(keys) => keys,
            Err(e) if e.is_not_found() => KeySet::default(),
            Err(e) => return Err(e),
        };

        if !keys.is_empty() {
            if let Ok(key) = find_private_key(&keys) {
                debug!(jwks = %set, kid = %key.kid, "Resolved existing private key");
                return Ok(key);
            }
        }

        let manager = self.manager.clone();
        let generated = self
            .flight
            .run(GenerationRequest::new(set, alg), async move {
                warn!(
                    jwks = %set,
                    alg = %alg,
                    "JSON Web Key not found in JSON Web Key Set {}, generating new key pair...",
                    set
                );
                manager
                    .generate_and_persist_key_set(set, kid, alg, KeyUse::Sig)
                    .await
                    .map_err(|e| match e {
                        failure @ JwkError::GenerationFailure { .. } => failure,
                        other => JwkError::generation(set, alg, other),
                    })
            })
            .await?;

        find_private_key(&generated).map_err(|_| {
            JwkError::generation(set, alg, "generated key set holds no private key")
        })
    }

    /// Make sure `set` holds a private key for `alg`, creating one (with
    /// `kid == set`) if needed.
    pub async fn ensure_asymmetric_keypair_exists(&self, alg: &str, set: &str) -> Result<()> {
        self.get_or_generate_keys(set, set, alg).await.map(|_| ())
    }
}
