//! Configuration for doorway-jwk
//!
//! CLI arguments and environment variable handling using clap.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::jwk::generate::{GeneratorConfig, KeyFamily, MAX_RSA_BITS, MIN_RSA_BITS};

/// Output produced after resolving the key
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Public JSON Web Key Set
    Jwks,
    /// JSON Web Key Set including exportable private keys
    JwksPrivate,
    /// PEM block of the private key
    Pem,
}

/// doorway-jwk - resolve (and if needed generate) a signing key
///
/// Keys live in memory for the duration of one run. Without `--jwks-file`
/// every run therefore generates a fresh key; with it, the set is loaded
/// from the file first and written back after a key was generated.
#[derive(Parser, Debug, Clone)]
#[command(name = "doorway-jwk")]
#[command(about = "Resolve or generate JSON Web Keys for token signing")]
pub struct Args {
    /// Key set identifier
    #[arg(long, env = "JWK_SET", default_value = "doorway.jwt.signing")]
    pub set: String,

    /// Key identifier for a newly generated key (defaults to the set name)
    #[arg(long, env = "JWK_KID")]
    pub kid: Option<String>,

    /// Signing algorithm (RS256, PS256, ES256, ES384, EdDSA, ...)
    #[arg(long, env = "JWK_ALG", default_value = "RS256")]
    pub alg: String,

    /// RSA modulus size in bits for RS*/PS* keys
    #[arg(long, env = "JWK_RSA_BITS", default_value = "4096")]
    pub rsa_bits: usize,

    /// JWKS file the key set is loaded from and saved to (holds private keys)
    #[arg(long, env = "JWK_FILE")]
    pub jwks_file: Option<PathBuf>,

    /// Output format
    #[arg(long, env = "JWK_FORMAT", value_enum, default_value = "jwks")]
    pub format: OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Key id to use when generating (the set name unless overridden)
    pub fn kid(&self) -> &str {
        self.kid.as_deref().unwrap_or(&self.set)
    }

    /// Key generation settings derived from the arguments
    pub fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            rsa_bits: self.rsa_bits,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.set.is_empty() {
            return Err("JWK_SET must not be empty".to_string());
        }

        KeyFamily::for_alg(&self.alg).map_err(|e| e.to_string())?;

        if !(MIN_RSA_BITS..=MAX_RSA_BITS).contains(&self.rsa_bits) {
            return Err(format!(
                "JWK_RSA_BITS must be between {} and {}",
                MIN_RSA_BITS, MAX_RSA_BITS
            ));
        }

        Ok(())
    }
}
