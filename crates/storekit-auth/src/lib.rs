//! # StoreKit Auth - Bearer Token Issuer
//!
//! Mints the short-lived ES256 JSON Web Tokens that authorize App Store Server API
//! requests, and caches the last one until it expires.
//!
//! ## Core Features
//!
//! - **ES256 only** - the signing key must be a PKCS#8 PEM encoded P-256 key (`.p8` file)
//! - **One mint per expiry window** - check-and-mint runs under a single lock, so
//!   concurrent callers never race to mint
//! - **Overridable clock** - issued-at and expires-at can be supplied by the caller
//!
//! ## Architecture
//!
//! - `error` - [`AuthError`] taxonomy
//! - `identity` - [`SigningIdentity`], the immutable key material and claim inputs
//! - `issuer` - [`TokenIssuer`], the cached token state machine
//!
//! ## Example
//!
//! ```rust,no_run
//! use storekit_auth::{SigningIdentity, TokenIssuer};
//!
//! let identity = SigningIdentity::from_key_file("AuthKey_2X9R4HXF34.p8")?
//!     .with_key_id("2X9R4HXF34")
//!     .with_issuer("57246542-96fe-1a63-e053-0824d011072a")
//!     .with_bundle_id("com.example.app");
//!
//! let issuer = TokenIssuer::new(identity);
//! let bearer = issuer.generate_if_expired()?;
//! # let _ = bearer;
//! # Ok::<(), storekit_auth::AuthError>(())
//! ```

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod error;
pub mod identity;
pub mod issuer;

pub use error::AuthError;
pub use identity::{SigningIdentity, TimeFn};
pub use issuer::{BearerClaims, TokenIssuer};

/// Auth result type
pub type Result<T> = std::result::Result<T, AuthError>;

/// Audience used when the identity does not set one
pub const DEFAULT_AUDIENCE: &str = "appstoreconnect-v1";

/// Default token lifetime. The API rejects tokens whose `exp` is more than 60 minutes after `iat`.
pub const DEFAULT_TOKEN_LIFETIME_SECONDS: i64 = 3600;
