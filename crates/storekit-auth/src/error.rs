//! Error types for bearer token issuance

use thiserror::Error;

/// Errors raised while minting a bearer token
///
/// All of these are terminal: the issuer never retries a failed mint.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The key material is not a PEM encoded PKCS#8 document
    #[error("Signing key must be a valid PKCS#8 PEM (.p8) file: {reason}")]
    InvalidKeyMaterial {
        /// What failed to decode
        reason: String,
    },

    /// The key decoded but is not a P-256 elliptic curve key
    #[error("Signing key must be an ECDSA P-256 private key, got algorithm {algorithm}")]
    UnsupportedKeyType {
        /// Algorithm identifier found in the key
        algorithm: String,
    },

    /// The JWT library refused to sign
    #[error("Token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    /// The system clock is before the Unix epoch
    #[error("System clock is before the Unix epoch")]
    Clock,

    /// Reading the key file failed
    #[error("Failed to read signing key from {path}: {source}")]
    KeyFile {
        /// Path that was read
        path: std::path::PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl AuthError {
    pub(crate) fn invalid_key(reason: impl Into<String>) -> Self {
        Self::InvalidKeyMaterial {
            reason: reason.into(),
        }
    }
}
