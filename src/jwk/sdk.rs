//! Sanitizing keys handed to API client SDKs.
//!
//! SDK consumers get keys in their own flat, stringly-typed shape
//! ([`SdkJsonWebKey`]). Before such keys leave the process they are pushed
//! through the typed representation so every private member is dropped by
//! construction rather than by a field deny-list.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{JwkError, Result};

use super::key::JsonWebKey;

/// JSON Web Key as exposed by the generated admin API client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdkJsonWebKey {
    #[serde(default)]
    pub alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dq: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_ops: Option<Vec<String>>,
    #[serde(default)]
    pub kid: String,
    pub kty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qi: Option<String>,
    #[serde(rename = "use", default, skip_serializing_if = "String::is_empty")]
    pub key_use: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x5c: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x5t: Option<String>,
    #[serde(rename = "x5t#S256", default, skip_serializing_if = "Option::is_none")]
    pub x5t_s256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x5u: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

fn sdk_error(stage: &str, err: serde_json::Error) -> JwkError {
    JwkError::Serialization(format!("failed to {stage} JSON Web Key Set: {err}"))
}

/// Strip private material from SDK keys.
///
/// Any failure at any stage fails the whole call; partial output is never
/// returned.
pub fn only_public_sdk_keys(keys: &[SdkJsonWebKey]) -> Result<Vec<SdkJsonWebKey>> {
    let encoded = serde_json::to_vec(keys).map_err(|e| sdk_error("encode", e))?;
    let interim: Vec<JsonWebKey> =
        serde_json::from_slice(&encoded).map_err(|e| sdk_error("decode", e))?;

    let public: Vec<JsonWebKey> = interim.iter().map(JsonWebKey::public).collect();

    let encoded = serde_json::to_vec(&public).map_err(|e| sdk_error("encode", e))?;
    let out: Vec<SdkJsonWebKey> =
        serde_json::from_slice(&encoded).map_err(|e| sdk_error("decode", e))?;

    debug!(keys = out.len(), "Sanitized SDK key set");
    Ok(out)
}
