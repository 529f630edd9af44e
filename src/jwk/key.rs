//! JSON Web Key and JSON Web Key Set (RFC 7517).
//!
//! [`JsonWebKey`] pairs the key metadata (`kid`, `use`, `alg`) with typed
//! [`KeyMaterial`]. Serialization goes through [`RawJwk`], the flat member
//! map defined by RFC 7518 section 6, with big integers and coordinates
//! encoded as unpadded base64url.

use base64::{
    engine::general_purpose::{STANDARD as B64, URL_SAFE_NO_PAD as B64URL},
    Engine as _,
};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroizing;

use crate::types::{JwkError, Result};

use super::generate::MAX_RSA_BITS;
use super::material::{EcPrivateKey, EcPublicKey, KeyMaterial};

/// Intended use of a key (`use` member).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyUse {
    Sig,
    Enc,
}

impl KeyUse {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sig => "sig",
            Self::Enc => "enc",
        }
    }
}

impl std::fmt::Display for KeyUse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// X.509 members of a key (RFC 7517 section 4.6 to 4.9).
///
/// Carried through unchanged, including in the public projection. The
/// chain is not parsed, so nothing checks that the leaf certificate matches
/// the key material.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateInfo {
    /// `x5u`
    pub url: Option<String>,
    /// `x5c`: base64 (not base64url) DER certificates, leaf first
    pub chain: Vec<String>,
    /// `x5t`: base64url SHA-1 thumbprint
    pub sha1_thumbprint: Option<String>,
    /// `x5t#S256`: base64url SHA-256 thumbprint
    pub sha256_thumbprint: Option<String>,
}

impl CertificateInfo {
    pub fn is_empty(&self) -> bool {
        self.url.is_none()
            && self.chain.is_empty()
            && self.sha1_thumbprint.is_none()
            && self.sha256_thumbprint.is_none()
    }
}

// =============================================================================
// JSON Web Key
// =============================================================================

/// A single key entry.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonWebKey {
    /// Key identifier
    pub kid: String,
    /// Intended use; absent in some externally supplied sets
    pub key_use: Option<KeyUse>,
    /// Permitted operations (`key_ops`), kept verbatim
    pub key_ops: Vec<String>,
    /// JOSE algorithm, e.g. `RS256`
    pub alg: String,
    pub certificates: CertificateInfo,
    /// The key itself
    pub material: KeyMaterial,
}

impl JsonWebKey {
    pub fn new(
        kid: impl Into<String>,
        key_use: Option<KeyUse>,
        alg: impl Into<String>,
        material: KeyMaterial,
    ) -> Self {
        Self {
            kid: kid.into(),
            key_use,
            key_ops: Vec::new(),
            alg: alg.into(),
            certificates: CertificateInfo::default(),
            material,
        }
    }

    /// True iff the material has no private component.
    pub fn is_public(&self) -> bool {
        self.material.is_public()
    }

    /// Copy of this entry with its material projected to public. Metadata
    /// and certificate members are kept.
    pub fn public(&self) -> JsonWebKey {
        JsonWebKey {
            kid: self.kid.clone(),
            key_use: self.key_use,
            key_ops: self.key_ops.clone(),
            alg: self.alg.clone(),
            certificates: self.certificates.clone(),
            material: self.material.public(),
        }
    }
}

impl Serialize for JsonWebKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        RawJwk::try_from(self)
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for JsonWebKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = RawJwk::deserialize(deserializer)?;
        JsonWebKey::try_from(raw).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// JSON Web Key Set
// =============================================================================

/// Ordered key collection. Order comes from storage or generation and only
/// matters for "first match wins" selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeySet {
    pub keys: Vec<JsonWebKey>,
}

impl KeySet {
    pub fn new(keys: Vec<JsonWebKey>) -> Self {
        Self { keys }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Find an entry by key id.
    pub fn key(&self, kid: &str) -> Option<&JsonWebKey> {
        self.keys.iter().find(|k| k.kid == kid)
    }
}

// =============================================================================
// Wire Representation
// =============================================================================

/// Flat RFC 7517 member map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawJwk {
    pub kty: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kid: String,
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub key_use: Option<KeyUse>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_ops: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x5u: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub x5c: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x5t: Option<String>,
    #[serde(rename = "x5t#S256", default, skip_serializing_if = "Option::is_none")]
    pub x5t_s256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dq: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

fn encode_uint(value: &BigUint) -> String {
    B64URL.encode(value.to_bytes_be())
}

/// Fixed-width big-endian field, left-padded to `len` bytes.
fn encode_field(bytes: &[u8], len: usize) -> String {
    let mut out = vec![0u8; len.saturating_sub(bytes.len())];
    out.extend_from_slice(bytes);
    B64URL.encode(out)
}

fn decode_member(kid: &str, name: &str, value: Option<&String>) -> Result<Zeroizing<Vec<u8>>> {
    let value = value.ok_or_else(|| {
        JwkError::Serialization(format!("key {kid}: missing required member '{name}'"))
    })?;
    B64URL
        .decode(value)
        .map(Zeroizing::new)
        .map_err(|e| JwkError::Serialization(format!("key {kid}: invalid base64url in '{name}': {e}")))
}

fn decode_uint(kid: &str, name: &str, value: Option<&String>) -> Result<BigUint> {
    decode_member(kid, name, value).map(|bytes| BigUint::from_bytes_be(&bytes))
}

fn decode_array<const N: usize>(kid: &str, name: &str, value: Option<&String>) -> Result<[u8; N]> {
    let bytes = decode_member(kid, name, value)?;
    bytes.as_slice().try_into().map_err(|_| {
        JwkError::Serialization(format!(
            "key {kid}: member '{name}' must be {N} bytes, got {}",
            bytes.len()
        ))
    })
}

/// Uncompressed SEC1 point from JWK coordinates.
fn sec1_point(kid: &str, raw: &RawJwk, field_len: usize) -> Result<Vec<u8>> {
    let x = decode_member(kid, "x", raw.x.as_ref())?;
    let y = decode_member(kid, "y", raw.y.as_ref())?;
    if x.len() != field_len || y.len() != field_len {
        return Err(JwkError::Serialization(format!(
            "key {kid}: EC coordinates must be {field_len} bytes"
        )));
    }
    let mut point = Vec::with_capacity(1 + 2 * field_len);
    point.push(0x04);
    point.extend_from_slice(&x);
    point.extend_from_slice(&y);
    Ok(point)
}

fn invalid_key(kid: &str, err: impl std::fmt::Display) -> JwkError {
    JwkError::Serialization(format!("key {kid}: {err}"))
}

fn check_thumbprint(kid: &str, name: &str, value: Option<&String>, len: usize) -> Result<()> {
    if value.is_none() {
        return Ok(());
    }
    let digest = decode_member(kid, name, value)?;
    if digest.len() != len {
        return Err(JwkError::Serialization(format!(
            "key {kid}: '{name}' must be a {len} byte digest, got {}",
            digest.len()
        )));
    }
    Ok(())
}

/// Certificate members from the wire form. Encodings and digest sizes are
/// checked; the certificates themselves are not parsed.
fn decode_certificates(kid: &str, raw: &mut RawJwk) -> Result<CertificateInfo> {
    for (i, cert) in raw.x5c.iter().enumerate() {
        B64.decode(cert).map_err(|e| {
            JwkError::Serialization(format!("key {kid}: invalid base64 in 'x5c[{i}]': {e}"))
        })?;
    }
    check_thumbprint(kid, "x5t", raw.x5t.as_ref(), 20)?;
    check_thumbprint(kid, "x5t#S256", raw.x5t_s256.as_ref(), 32)?;

    Ok(CertificateInfo {
        url: raw.x5u.take(),
        chain: std::mem::take(&mut raw.x5c),
        sha1_thumbprint: raw.x5t.take(),
        sha256_thumbprint: raw.x5t_s256.take(),
    })
}

impl TryFrom<&JsonWebKey> for RawJwk {
    type Error = JwkError;

    fn try_from(key: &JsonWebKey) -> Result<Self> {
        let mut raw = RawJwk {
            kid: key.kid.clone(),
            key_use: key.key_use,
            key_ops: key.key_ops.clone(),
            alg: key.alg.clone(),
            x5u: key.certificates.url.clone(),
            x5c: key.certificates.chain.clone(),
            x5t: key.certificates.sha1_thumbprint.clone(),
            x5t_s256: key.certificates.sha256_thumbprint.clone(),
            ..Default::default()
        };

        match &key.material {
            KeyMaterial::RsaPublic(k) => {
                raw.kty = "RSA".into();
                raw.n = Some(encode_uint(k.n()));
                raw.e = Some(encode_uint(k.e()));
            }
            KeyMaterial::RsaPrivate(k) => {
                let [p, q] = k.primes() else {
                    return Err(JwkError::UnsupportedKeyType(format!(
                        "key {}: multi-prime RSA keys cannot be encoded",
                        key.kid
                    )));
                };
                raw.kty = "RSA".into();
                raw.n = Some(encode_uint(k.n()));
                raw.e = Some(encode_uint(k.e()));
                raw.d = Some(encode_uint(k.d()));
                raw.p = Some(encode_uint(p));
                raw.q = Some(encode_uint(q));
                raw.dp = k.dp().map(encode_uint);
                raw.dq = k.dq().map(encode_uint);
                raw.qi = k.crt_coefficient().as_ref().map(encode_uint);
            }
            KeyMaterial::EcPublic(k) => {
                raw.kty = "EC".into();
                raw.crv = Some(k.curve().into());
                set_ec_coordinates(&mut raw, k);
            }
            KeyMaterial::EcPrivate(k) => {
                raw.kty = "EC".into();
                raw.crv = Some(k.curve().into());
                set_ec_coordinates(&mut raw, &k.public_key());
                raw.d = Some(match k {
                    EcPrivateKey::P256(s) => B64URL.encode(s.to_bytes()),
                    EcPrivateKey::P384(s) => B64URL.encode(s.to_bytes()),
                });
            }
            KeyMaterial::Ed25519Public(k) => {
                raw.kty = "OKP".into();
                raw.crv = Some("Ed25519".into());
                raw.x = Some(B64URL.encode(k.as_bytes()));
            }
            KeyMaterial::Ed25519Private(k) => {
                raw.kty = "OKP".into();
                raw.crv = Some("Ed25519".into());
                raw.x = Some(B64URL.encode(k.verifying_key().as_bytes()));
                raw.d = Some(B64URL.encode(k.as_bytes()));
            }
            KeyMaterial::Opaque(_) => {
                return Err(JwkError::UnsupportedKeyType(format!(
                    "key {}: opaque signers cannot be serialized",
                    key.kid
                )));
            }
        }

        Ok(raw)
    }
}

fn set_ec_coordinates(raw: &mut RawJwk, key: &EcPublicKey) {
    use p256::elliptic_curve::sec1::ToEncodedPoint;

    let (x, y, len) = match key {
        EcPublicKey::P256(k) => {
            let point = k.to_encoded_point(false);
            (point.x().map(|c| c.to_vec()), point.y().map(|c| c.to_vec()), 32)
        }
        EcPublicKey::P384(k) => {
            let point = k.to_encoded_point(false);
            (point.x().map(|c| c.to_vec()), point.y().map(|c| c.to_vec()), 48)
        }
    };
    raw.x = x.map(|x| encode_field(&x, len));
    raw.y = y.map(|y| encode_field(&y, len));
}

impl TryFrom<RawJwk> for JsonWebKey {
    type Error = JwkError;

    fn try_from(mut raw: RawJwk) -> Result<Self> {
        let kid = raw.kid.clone();
        let material = match raw.kty.as_str() {
            "RSA" => decode_rsa(&kid, &raw)?,
            "EC" => decode_ec(&kid, &raw)?,
            "OKP" => decode_okp(&kid, &raw)?,
            other => {
                return Err(JwkError::UnsupportedKeyType(format!(
                    "key {kid}: unsupported kty '{other}'"
                )))
            }
        };
        let certificates = decode_certificates(&kid, &mut raw)?;

        Ok(JsonWebKey {
            kid,
            key_use: raw.key_use,
            key_ops: raw.key_ops,
            alg: raw.alg,
            certificates,
            material,
        })
    }
}

fn decode_rsa(kid: &str, raw: &RawJwk) -> Result<KeyMaterial> {
    let n = decode_uint(kid, "n", raw.n.as_ref())?;
    let e = decode_uint(kid, "e", raw.e.as_ref())?;

    if raw.d.is_none() {
        let key = RsaPublicKey::new_with_max_size(n, e, MAX_RSA_BITS)
            .map_err(|err| invalid_key(kid, err))?;
        return Ok(KeyMaterial::RsaPublic(key));
    }

    let d = decode_uint(kid, "d", raw.d.as_ref())?;
    let primes = match (&raw.p, &raw.q) {
        (Some(_), Some(_)) => vec![
            decode_uint(kid, "p", raw.p.as_ref())?,
            decode_uint(kid, "q", raw.q.as_ref())?,
        ],
        _ => {
            return Err(JwkError::Serialization(format!(
                "key {kid}: RSA private keys require 'p' and 'q'"
            )))
        }
    };

    if n.bits() > MAX_RSA_BITS {
        return Err(invalid_key(kid, format!("modulus larger than {MAX_RSA_BITS} bits")));
    }
    // from_components checks the primes and exponents but not the modulus size.
    let key = RsaPrivateKey::from_components(n, e, d, primes).map_err(|err| invalid_key(kid, err))?;
    Ok(KeyMaterial::RsaPrivate(key))
}

fn decode_ec(kid: &str, raw: &RawJwk) -> Result<KeyMaterial> {
    let crv = raw.crv.as_deref().unwrap_or_default();
    let public = match crv {
        "P-256" => EcPublicKey::P256(
            p256::PublicKey::from_sec1_bytes(&sec1_point(kid, raw, 32)?)
                .map_err(|err| invalid_key(kid, err))?,
        ),
        "P-384" => EcPublicKey::P384(
            p384::PublicKey::from_sec1_bytes(&sec1_point(kid, raw, 48)?)
                .map_err(|err| invalid_key(kid, err))?,
        ),
        other => {
            return Err(JwkError::UnsupportedKeyType(format!(
                "key {kid}: unsupported curve '{other}'"
            )))
        }
    };

    if raw.d.is_none() {
        return Ok(KeyMaterial::EcPublic(public));
    }

    let d = decode_member(kid, "d", raw.d.as_ref())?;
    let private = match crv {
        "P-256" => EcPrivateKey::P256(
            p256::SecretKey::from_slice(&d).map_err(|err| invalid_key(kid, err))?,
        ),
        _ => EcPrivateKey::P384(
            p384::SecretKey::from_slice(&d).map_err(|err| invalid_key(kid, err))?,
        ),
    };

    if private.public_key() != public {
        return Err(JwkError::Serialization(format!(
            "key {kid}: private scalar does not match the public point"
        )));
    }
    Ok(KeyMaterial::EcPrivate(private))
}

fn decode_okp(kid: &str, raw: &RawJwk) -> Result<KeyMaterial> {
    match raw.crv.as_deref() {
        Some("Ed25519") => {}
        other => {
            return Err(JwkError::UnsupportedKeyType(format!(
                "key {kid}: unsupported OKP curve '{}'",
                other.unwrap_or_default()
            )))
        }
    }

    let x: [u8; 32] = decode_array(kid, "x", raw.x.as_ref())?;
    let public = VerifyingKey::from_bytes(&x).map_err(|err| invalid_key(kid, err))?;

    if raw.d.is_none() {
        return Ok(KeyMaterial::Ed25519Public(public));
    }

    let d = Zeroizing::new(decode_array::<32>(kid, "d", raw.d.as_ref())?);
    let private = SigningKey::from_bytes(&d);
    if private.verifying_key() != public {
        return Err(JwkError::Serialization(format!(
            "key {kid}: private key does not match 'x'"
        )));
    }
    Ok(KeyMaterial::Ed25519Private(private))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_ed25519_private_serializes_with_d() {
        let key = JsonWebKey::new(
            "ed-1",
            Some(KeyUse::Sig),
            "EdDSA",
            KeyMaterial::Ed25519Private(SigningKey::generate(&mut OsRng)),
        );

        let value = serde_json::to_value(&key).unwrap();
        assert_eq!(value["kty"], "OKP");
        assert_eq!(value["crv"], "Ed25519");
        assert_eq!(value["use"], "sig");
        assert!(value["d"].is_string());

        let parsed: JsonWebKey = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn test_ec_public_has_no_private_members() {
        let secret = p256::SecretKey::random(&mut OsRng);
        let key = JsonWebKey::new(
            "ec-1",
            Some(KeyUse::Sig),
            "ES256",
            KeyMaterial::EcPublic(EcPublicKey::P256(secret.public_key())),
        );

        let value = serde_json::to_value(&key).unwrap();
        assert_eq!(value["kty"], "EC");
        assert_eq!(value["crv"], "P-256");
        assert_eq!(B64URL.decode(value["x"].as_str().unwrap()).unwrap().len(), 32);
        assert!(value.get("d").is_none());
    }

    #[test]
    fn test_mismatched_ec_private_key_is_rejected() {
        let a = p256::SecretKey::random(&mut OsRng);
        let b = p256::SecretKey::random(&mut OsRng);
        let key = JsonWebKey::new(
            "ec-1",
            None,
            "ES256",
            KeyMaterial::EcPrivate(EcPrivateKey::P256(a)),
        );

        let mut value = serde_json::to_value(&key).unwrap();
        value["d"] = serde_json::Value::String(B64URL.encode(b.to_bytes()));

        let err = serde_json::from_value::<JsonWebKey>(value).unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[test]
    fn test_unknown_kty_is_rejected() {
        let err = serde_json::from_str::<JsonWebKey>(r#"{"kty":"oct","k":"c2VjcmV0"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("unsupported kty"));
    }

    #[test]
    fn test_certificate_members_survive_public_projection() {
        let secret = p256::SecretKey::random(&mut OsRng);
        let mut key = JsonWebKey::new(
            "ec-1",
            Some(KeyUse::Sig),
            "ES256",
            KeyMaterial::EcPrivate(EcPrivateKey::P256(secret)),
        );
        key.key_ops = vec!["sign".into()];
        key.certificates = CertificateInfo {
            url: Some("https://doorway.example/certs/ec-1.pem".into()),
            chain: vec![B64.encode(b"leaf certificate"), B64.encode(b"intermediate")],
            sha1_thumbprint: Some(B64URL.encode([7u8; 20])),
            sha256_thumbprint: Some(B64URL.encode([9u8; 32])),
        };

        let value = serde_json::to_value(key.public()).unwrap();
        assert_eq!(value["x5c"].as_array().map(Vec::len), Some(2));
        assert_eq!(value["x5u"], "https://doorway.example/certs/ec-1.pem");
        assert!(value["x5t#S256"].is_string());
        assert_eq!(value["key_ops"][0], "sign");
        assert!(value.get("d").is_none());

        let parsed: JsonWebKey = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.certificates, key.certificates);
        assert_eq!(parsed.key_ops, key.key_ops);
    }

    #[test]
    fn test_wrong_size_thumbprint_is_rejected() {
        let key = JsonWebKey::new(
            "ed-1",
            None,
            "EdDSA",
            KeyMaterial::Ed25519Public(SigningKey::generate(&mut OsRng).verifying_key()),
        );
        let mut value = serde_json::to_value(&key).unwrap();
        value["x5t"] = serde_json::Value::String(B64URL.encode([1u8; 32]));

        let err = serde_json::from_value::<JsonWebKey>(value).unwrap_err();
        assert!(err.to_string().contains("20 byte digest"));
    }

    #[test]
    fn test_key_set_lookup_by_kid() {
        let set = KeySet::new(vec![
            JsonWebKey::new(
                "a",
                Some(KeyUse::Sig),
                "EdDSA",
                KeyMaterial::Ed25519Private(SigningKey::generate(&mut OsRng)),
            ),
            JsonWebKey::new(
                "b",
                Some(KeyUse::Enc),
                "EdDSA",
                KeyMaterial::Ed25519Private(SigningKey::generate(&mut OsRng)),
            ),
        ]);

        assert_eq!(set.key("b").map(|k| k.key_use), Some(Some(KeyUse::Enc)));
        assert!(set.key("c").is_none());
    }
}
