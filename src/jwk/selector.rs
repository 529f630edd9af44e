//! Key selection policy over an in-memory key set.
//!
//! Selection is "first match wins" in set order. There is no notion of a
//! preferred algorithm or of key freshness; whoever writes a set puts the
//! key that should be used first (new keys are prepended).
//!
//! None of these functions mutate their input.

use crate::types::{JwkError, Result};

use super::key::{JsonWebKey, KeySet};

/// First key of a slice, if any.
pub fn first(keys: &[JsonWebKey]) -> Option<&JsonWebKey> {
    keys.first()
}

/// First private-capable key in set order.
pub fn find_private_key(set: &KeySet) -> Result<JsonWebKey> {
    exclude_public_keys(set)
        .keys
        .into_iter()
        .next()
        .ok_or_else(|| JwkError::NotFound("key not found: set holds no private key".into()))
}

/// First key of the set, projected to its public form.
pub fn find_public_key(set: &KeySet) -> Result<JsonWebKey> {
    exclude_private_keys(set)
        .keys
        .into_iter()
        .next()
        .ok_or_else(|| JwkError::NotFound("key not found: set is empty".into()))
}

/// Keys that carry private material. Public-only entries are dropped.
pub fn exclude_public_keys(set: &KeySet) -> KeySet {
    KeySet::new(set.keys.iter().filter(|k| !k.is_public()).cloned().collect())
}

/// Every key projected to public. The result has the same length as `set`.
pub fn exclude_private_keys(set: &KeySet) -> KeySet {
    KeySet::new(set.keys.iter().map(JsonWebKey::public).collect())
}

/// Opaque signers projected to public, all other keys passed through with
/// their private material intact. The result has the same length as `set`.
pub fn exclude_opaque_private_keys(set: &KeySet) -> KeySet {
    KeySet::new(
        set.keys
            .iter()
            .map(|k| {
                if k.material.is_opaque() {
                    k.public()
                } else {
                    k.clone()
                }
            })
            .collect(),
    )
}
