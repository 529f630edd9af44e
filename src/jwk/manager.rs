//! Key set storage.
//!
//! [`KeyManager`] is the seam to whatever durably stores key sets. The
//! resolver only needs two operations from it. [`InMemoryKeyManager`] backs
//! the CLI and the tests; the CLI persists it to a JWKS file between runs.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::types::{JwkError, Result};

use super::generate::{generate_key_set, GeneratorConfig};
use super::key::{KeySet, KeyUse};
use super::selector::exclude_opaque_private_keys;

/// Trait for key set storage (allows different backends)
#[async_trait]
pub trait KeyManager: Send + Sync {
    /// Load the key set stored under `set`.
    ///
    /// Returns [`JwkError::NotFound`] if nothing is stored under `set`.
    async fn get_key_set(&self, set: &str) -> Result<KeySet>;

    /// Generate a new key for `set`, persist it and return the generated set.
    async fn generate_and_persist_key_set(
        &self,
        set: &str,
        kid: &str,
        alg: &str,
        key_use: KeyUse,
    ) -> Result<KeySet>;
}

/// Simple in-memory key set store
pub struct InMemoryKeyManager {
    sets: DashMap<String, KeySet>,
    config: GeneratorConfig,
    generations: AtomicUsize,
}

impl InMemoryKeyManager {
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            sets: DashMap::new(),
            config,
            generations: AtomicUsize::new(0),
        }
    }

    /// Add keys to `set`. New keys go in front so they win "first match"
    /// selection.
    pub fn add_key_set(&self, set: &str, keys: KeySet) {
        let mut entry = self.sets.entry(set.to_string()).or_default();
        let mut merged = keys.keys;
        merged.append(&mut entry.keys);
        entry.keys = merged;
    }

    /// Remove a whole set. Returns true if it existed.
    pub fn delete_key_set(&self, set: &str) -> bool {
        self.sets.remove(set).is_some()
    }

    /// Number of completed generate-and-persist calls.
    pub fn generation_count(&self) -> usize {
        self.generations.load(Ordering::SeqCst)
    }

    /// Load a JWKS document from `path` into `set`. A missing file loads
    /// nothing. Returns the number of keys loaded.
    pub async fn load_file(&self, set: &str, path: &Path) -> Result<usize> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No key set file yet");
                return Ok(0);
            }
            Err(e) => {
                return Err(JwkError::Storage(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let keys: KeySet = serde_json::from_slice(&bytes)?;
        let count = keys.len();
        self.add_key_set(set, keys);

        info!(jwks = %set, path = %path.display(), keys = count, "Loaded key set file");
        Ok(count)
    }

    /// Write `set` to `path` as a JWKS document, private keys included.
    /// Opaque signers are written as their public key.
    pub async fn save_file(&self, set: &str, path: &Path) -> Result<()> {
        let keys = self.get_key_set(set).await?;
        let json = serde_json::to_vec_pretty(&exclude_opaque_private_keys(&keys))?;

        tokio::fs::write(path, json).await.map_err(|e| {
            JwkError::Storage(format!("failed to write {}: {}", path.display(), e))
        })?;

        info!(jwks = %set, path = %path.display(), keys = keys.len(), "Saved key set file");
        Ok(())
    }
}

impl Default for InMemoryKeyManager {
    fn default() -> Self {
        Self::new(GeneratorConfig::default())
    }
}

#[async_trait]
impl KeyManager for InMemoryKeyManager {
    async fn get_key_set(&self, set: &str) -> Result<KeySet> {
        self.sets
            .get(set)
            .map(|keys| keys.value().clone())
            .filter(|keys| !keys.is_empty())
            .ok_or_else(|| JwkError::NotFound(format!("key set {set} not found")))
    }

    async fn generate_and_persist_key_set(
        &self,
        set: &str,
        kid: &str,
        alg: &str,
        key_use: KeyUse,
    ) -> Result<KeySet> {
        let config = self.config.clone();
        let (set_id, kid_owned, alg_owned) = (set.to_string(), kid.to_string(), alg.to_string());

        debug!(jwks = %set, alg = %alg, "Generating key set on blocking thread");
        let generated = tokio::task::spawn_blocking(move || {
            generate_key_set(&set_id, &kid_owned, &alg_owned, key_use, &config)
        })
        .await
        .map_err(|e| JwkError::generation(set, alg, e))??;

        self.add_key_set(set, generated.clone());
        self.generations.fetch_add(1, Ordering::SeqCst);

        info!(
            jwks = %set,
            alg = %alg,
            kid = %generated.keys.first().map(|k| k.kid.as_str()).unwrap_or_default(),
            "Persisted generated key set"
        );

        Ok(generated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwk::selector::find_private_key;

    #[tokio::test]
    async fn test_get_missing_set_is_not_found() {
        let manager = InMemoryKeyManager::default();
        let err = manager.get_key_set("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_generated_keys_are_prepended() {
        let manager = InMemoryKeyManager::default();

        manager
            .generate_and_persist_key_set("set", "old", "EdDSA", KeyUse::Sig)
            .await
            .unwrap();
        manager
            .generate_and_persist_key_set("set", "new", "ES256", KeyUse::Sig)
            .await
            .unwrap();

        let stored = manager.get_key_set("set").await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(find_private_key(&stored).unwrap().kid, "new");
        assert_eq!(manager.generation_count(), 2);
    }

    #[test]
    fn test_add_key_set_is_visible() {
        let manager = InMemoryKeyManager::default();
        let keys = generate_key_set("set", "k", "EdDSA", KeyUse::Sig, &GeneratorConfig::default())
            .unwrap();
        manager.add_key_set("set", keys.clone());

        let stored = tokio_test::assert_ok!(tokio_test::block_on(manager.get_key_set("set")));
        assert_eq!(stored, keys);
        assert_eq!(manager.generation_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_key_set() {
        let manager = InMemoryKeyManager::default();
        manager
            .generate_and_persist_key_set("set", "k", "EdDSA", KeyUse::Sig)
            .await
            .unwrap();

        assert!(manager.delete_key_set("set"));
        assert!(!manager.delete_key_set("set"));
        assert!(manager.get_key_set("set").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_key_set_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jwks.json");

        let manager = InMemoryKeyManager::default();
        assert_eq!(manager.load_file("set", &path).await.unwrap(), 0);
        manager
            .generate_and_persist_key_set("set", "k", "ES256", KeyUse::Sig)
            .await
            .unwrap();
        manager.save_file("set", &path).await.unwrap();

        let reloaded = InMemoryKeyManager::default();
        assert_eq!(reloaded.load_file("set", &path).await.unwrap(), 1);
        assert_eq!(
            reloaded.get_key_set("set").await.unwrap(),
            manager.get_key_set("set").await.unwrap()
        );
        assert!(!find_private_key(&reloaded.get_key_set("set").await.unwrap())
            .unwrap()
            .is_public());
    }

    #[tokio::test]
    async fn test_malformed_key_set_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jwks.json");
        tokio::fs::write(&path, b"{\"keys\": [{\"kty\": \"RSA\"}]}")
            .await
            .unwrap();

        let manager = InMemoryKeyManager::default();
        let err = manager.load_file("set", &path).await.unwrap_err();
        assert!(matches!(err, JwkError::Serialization(_)));
        assert!(manager.get_key_set("set").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_unsupported_algorithm_persists_nothing() {
        let manager = InMemoryKeyManager::default();
        let err = manager
            .generate_and_persist_key_set("set", "k", "none", KeyUse::Sig)
            .await
            .unwrap_err();

        assert!(matches!(err, JwkError::UnsupportedAlgorithm(_)));
        assert_eq!(manager.generation_count(), 0);
        assert!(manager.get_key_set("set").await.is_err());
    }
}
