//! # StoreKit Trust - Root Certificates and Signed-Payload Verification
//!
//! Payloads pushed or returned by the App Store (transactions, renewal info, server
//! notifications) are compact JWS tokens whose header embeds an `x5c` certificate
//! chain. This crate decides which roots that chain must end in, and verifies tokens
//! against them.
//!
//! ## Architecture
//!
//! - `pool` - [`CertificatePool`], the immutable set of trusted roots
//! - `store` - [`TrustStore`], one-shot assembly of the pool from the pinned Apple root,
//!   a local bundle directory and a best-effort refresh from Apple's certificate index
//! - `verifier` - [`SignedPayloadVerifier`], chain walk plus ES256 signature check
//! - `error` - [`TrustError`] and [`VerifyError`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use storekit_trust::{SignedPayloadVerifier, TrustStore, TrustStoreConfig};
//!
//! # async fn run(token: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(TrustStore::new(TrustStoreConfig::default()));
//! store.init().await;
//!
//! let verifier = SignedPayloadVerifier::new(store);
//! let claims: serde_json::Value = verifier.verify(token)?;
//! # let _ = claims;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `test-utils` - synthetic root/intermediate/leaf PKI that signs tokens

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod error;
pub mod pool;
pub mod store;
pub mod verifier;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{TrustError, VerifyError};
pub use pool::CertificatePool;
pub use store::{TrustStore, TrustStoreConfig};
pub use verifier::{SignedPayloadVerifier, decode_payload_unverified};

/// Apple's certificate authority index page
pub const APPLE_CERTIFICATE_INDEX: &str = "https://www.apple.com/certificateauthority/";

/// Apple Root CA - G3, the root every App Store signing chain ends in
pub const APPLE_ROOT_CA_G3_PEM: &str = "-----BEGIN CERTIFICATE-----
MIICQzCCAcmgAwIBAgIILcX8iNLFS5UwCgYIKoZIzj0EAwMwZzEbMBkGA1UEAwwS
QXBwbGUgUm9vdCBDQSAtIEczMSYwJAYDVQQLDB1BcHBsZSBDZXJ0aWZpY2F0aW9u
IEF1dGhvcml0eTETMBEGA1UECgwKQXBwbGUgSW5jLjELMAkGA1UEBhMCVVMwHhcN
MTQwNDMwMTgxOTA2WhcNMzkwNDMwMTgxOTA2WjBnMRswGQYDVQQDDBJBcHBsZSBS
b290IENBIC0gRzMxJjAkBgNVBAsMHUFwcGxlIENlcnRpZmljYXRpb24gQXV0aG9y
aXR5MRMwEQYDVQQKDApBcHBsZSBJbmMuMQswCQYDVQQGEwJVUzB2MBAGByqGSM49
AgEGBSuBBAAiA2IABJjpLz1AcqTtkyJygRMc3RCV8cWjTnHcFBbZDuWmBSp3ZHtf
TjjTuxxEtX/1H7YyYl3J6YRbTzBPEVoA/VhYDKX1DyxNB0cTddqXl5dvMVztK517
IDvYuVTZXpmkOlEKMaNCMEAwHQYDVR0OBBYEFLuw3qFYM4iapIqZ3r6966/ayySr
MA8GA1UdEwEB/wQFMAMBAf8wDgYDVR0PAQH/BAQDAgEGMAoGCCqGSM49BAMDA2gA
MGUCMQCD6cHEFl4aXTQY2e3v9GwOAEZLuN+yRhHFD/3meoyhpmvOwgPUnPWTxnS4
at+qIxUCMG1mihDK1A3UT82NQz60imOlM27jbdoXt2QfyFMm+YhidDkLF1vLUagM
6BgD56KyKA==
-----END CERTIFICATE-----
";
