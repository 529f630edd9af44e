//! Key material held by a JSON Web Key.
//!
//! Every supported algorithm family is a variant of [`KeyMaterial`], so each
//! dispatch point (selection, projection, PEM encoding, JWK encoding) is an
//! exhaustive `match`. Adding a curve or a key type fails to compile until
//! every one of those sites handles it.

use std::fmt;
use std::sync::Arc;

use ed25519_dalek::{SigningKey, VerifyingKey};
use rsa::{RsaPrivateKey, RsaPublicKey};

// =============================================================================
// Opaque Signers
// =============================================================================

/// A private key whose secret never leaves its backend (HSM, KMS, remote
/// signer).
///
/// Opaque signers count as private-capable for selection purposes but can
/// never be serialized or PEM-encoded. Signing goes through the backend's own
/// client; this crate only needs the public half.
pub trait OpaqueSigner: Send + Sync + fmt::Debug {
    /// Public half of the key held by the signer.
    fn public_key(&self) -> SignerPublicKey;
}

/// Public key reported by an [`OpaqueSigner`]. Has no private or opaque
/// variant, so projecting a signer always yields public material.
#[derive(Clone, Debug, PartialEq)]
pub enum SignerPublicKey {
    Rsa(RsaPublicKey),
    Ec(EcPublicKey),
    Ed25519(VerifyingKey),
}

impl From<SignerPublicKey> for KeyMaterial {
    fn from(key: SignerPublicKey) -> Self {
        match key {
            SignerPublicKey::Rsa(k) => Self::RsaPublic(k),
            SignerPublicKey::Ec(k) => Self::EcPublic(k),
            SignerPublicKey::Ed25519(k) => Self::Ed25519Public(k),
        }
    }
}

// =============================================================================
// Elliptic Curve Keys
// =============================================================================

/// NIST curve private key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EcPrivateKey {
    P256(p256::SecretKey),
    P384(p384::SecretKey),
}

/// NIST curve public key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EcPublicKey {
    P256(p256::PublicKey),
    P384(p384::PublicKey),
}

impl EcPrivateKey {
    pub fn public_key(&self) -> EcPublicKey {
        match self {
            Self::P256(k) => EcPublicKey::P256(k.public_key()),
            Self::P384(k) => EcPublicKey::P384(k.public_key()),
        }
    }

    /// JWK `crv` name.
    pub fn curve(&self) -> &'static str {
        match self {
            Self::P256(_) => "P-256",
            Self::P384(_) => "P-384",
        }
    }
}

impl EcPublicKey {
    /// JWK `crv` name.
    pub fn curve(&self) -> &'static str {
        match self {
            Self::P256(_) => "P-256",
            Self::P384(_) => "P-384",
        }
    }
}

// =============================================================================
// Key Material
// =============================================================================

/// The cryptographic payload of a key entry.
#[derive(Clone, Debug)]
pub enum KeyMaterial {
    RsaPrivate(RsaPrivateKey),
    RsaPublic(RsaPublicKey),
    EcPrivate(EcPrivateKey),
    EcPublic(EcPublicKey),
    Ed25519Private(SigningKey),
    Ed25519Public(VerifyingKey),
    Opaque(Arc<dyn OpaqueSigner>),
}

impl KeyMaterial {
    /// True iff this material carries no private component at all.
    pub fn is_public(&self) -> bool {
        match self {
            Self::RsaPublic(_) | Self::EcPublic(_) | Self::Ed25519Public(_) => true,
            Self::RsaPrivate(_) | Self::EcPrivate(_) | Self::Ed25519Private(_) => false,
            Self::Opaque(_) => false,
        }
    }

    /// True for handles that can sign but cannot be exported.
    pub fn is_opaque(&self) -> bool {
        matches!(self, Self::Opaque(_))
    }

    /// Public projection of this material. Already-public material is
    /// returned as-is.
    pub fn public(&self) -> KeyMaterial {
        match self {
            Self::RsaPrivate(k) => Self::RsaPublic(k.to_public_key()),
            Self::EcPrivate(k) => Self::EcPublic(k.public_key()),
            Self::Ed25519Private(k) => Self::Ed25519Public(k.verifying_key()),
            Self::RsaPublic(_) | Self::EcPublic(_) | Self::Ed25519Public(_) => self.clone(),
            Self::Opaque(signer) => signer.public_key().into(),
        }
    }

    /// Short name used in logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RsaPrivate(_) => "rsa-private",
            Self::RsaPublic(_) => "rsa-public",
            Self::EcPrivate(_) => "ec-private",
            Self::EcPublic(_) => "ec-public",
            Self::Ed25519Private(_) => "ed25519-private",
            Self::Ed25519Public(_) => "ed25519-public",
            Self::Opaque(_) => "opaque-signer",
        }
    }
}

impl PartialEq for KeyMaterial {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::RsaPrivate(a), Self::RsaPrivate(b)) => a == b,
            (Self::RsaPublic(a), Self::RsaPublic(b)) => a == b,
            (Self::EcPrivate(a), Self::EcPrivate(b)) => a == b,
            (Self::EcPublic(a), Self::EcPublic(b)) => a == b,
            (Self::Ed25519Private(a), Self::Ed25519Private(b)) => a == b,
            (Self::Ed25519Public(a), Self::Ed25519Public(b)) => a == b,
            (Self::Opaque(a), Self::Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}
