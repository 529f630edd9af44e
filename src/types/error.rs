//! Error types for doorway-jwk

/// Main error type for key resolution, selection and encoding.
///
/// `Clone` is required because a single generation result is fanned out to
/// every caller that joined the in-flight request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JwkError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failed to generate key set {set} ({alg}): {reason}")]
    GenerationFailure {
        set: String,
        alg: String,
        reason: String,
    },

    #[error("Key generation for set {set} ({alg}) was aborted before completing")]
    GenerationAborted { set: String, alg: String },

    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl JwkError {
    /// Wrap a backend failure that happened while generating a key set.
    pub fn generation(set: &str, alg: &str, reason: impl ToString) -> Self {
        Self::GenerationFailure {
            set: set.to_string(),
            alg: alg.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error means "nothing stored under that identifier".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

// Implement From conversions for common error types

impl From<serde_json::Error> for JwkError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(format!("JSON error: {}", err))
    }
}

impl From<rsa::pkcs1::Error> for JwkError {
    fn from(err: rsa::pkcs1::Error) -> Self {
        Self::Encoding(format!("PKCS#1 error: {}", err))
    }
}

impl From<ed25519_dalek::pkcs8::Error> for JwkError {
    fn from(err: ed25519_dalek::pkcs8::Error) -> Self {
        Self::Encoding(format!("PKCS#8 error: {}", err))
    }
}

/// Result type alias for doorway-jwk operations
pub type Result<T> = std::result::Result<T, JwkError>;
