//! Error types for the trust store and the verifier

use std::path::PathBuf;

use thiserror::Error;

/// Trust store errors
///
/// Only [`TrustError::NotInitialized`] reaches callers. The others describe why a
/// refresh or bundle load degraded and are logged, never returned, because the pinned
/// root alone is a working pool.
#[derive(Error, Debug)]
pub enum TrustError {
    /// [`TrustStore::init`](crate::TrustStore::init) has not completed yet
    #[error("Trust store has not been initialized")]
    NotInitialized,

    /// The certificate index could not be fetched
    #[error("Failed to fetch certificate index {url}: {reason}")]
    Index {
        /// Index URL
        url: String,
        /// Failure description
        reason: String,
    },

    /// A certificate could not be downloaded or saved
    #[error("Failed to download certificate {url}: {reason}")]
    Download {
        /// Certificate URL
        url: String,
        /// Failure description
        reason: String,
    },

    /// A local directory could not be read or written
    #[error("Certificate directory {path} is unusable: {source}")]
    Directory {
        /// Directory path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while verifying a signed payload
#[derive(Error, Debug)]
pub enum VerifyError {
    /// Not three dot-separated segments, or a segment failed to decode
    #[error("Malformed signed payload: {reason}")]
    MalformedToken {
        /// What failed
        reason: String,
    },

    /// The header carries no `x5c` chain
    #[error("Signed payload header has no x5c certificate chain")]
    MissingCertificateChain,

    /// A chain entry is not a base64 DER certificate. Position 0 is the leaf.
    #[error("Certificate at chain position {position} is invalid: {reason}")]
    InvalidCertificate {
        /// Index in the `x5c` array
        position: usize,
        /// Parse failure description
        reason: String,
    },

    /// The leaf key is not an ECDSA P-256 key
    #[error("Leaf certificate key must be ECDSA P-256")]
    UnsupportedKeyType,

    /// The chain does not lead to a trusted root
    #[error("Certificate chain verification failed: {0}")]
    ChainVerificationFailed(#[source] webpki::Error),

    /// The chain is trusted but the signature does not match the payload
    #[error("Signature verification failed: {0}")]
    SignatureInvalid(#[source] jsonwebtoken::errors::Error),

    /// The trust store is not ready
    #[error(transparent)]
    Trust(#[from] TrustError),
}

impl VerifyError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedToken {
            reason: reason.into(),
        }
    }
}
