//! Signing identity: the private key plus the claim inputs of every token

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use p256::pkcs8::{ObjectIdentifier, PrivateKeyInfo, SecretDocument};

use crate::{AuthError, DEFAULT_AUDIENCE, Result};

/// A clock override returning Unix seconds
pub type TimeFn = Arc<dyn Fn() -> i64 + Send + Sync>;

/// id-ecPublicKey
const EC_PUBLIC_KEY_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
/// secp256r1 / prime256v1
const P256_CURVE_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");

/// Key material and claim inputs for bearer tokens
///
/// Immutable once handed to a [`TokenIssuer`](crate::TokenIssuer).
#[derive(Clone)]
pub struct SigningIdentity {
    key_pem: Arc<[u8]>,
    key_id: String,
    issuer: String,
    bundle_id: String,
    audience: Option<String>,
    issued_at_fn: Option<TimeFn>,
    expires_at_fn: Option<TimeFn>,
}

impl SigningIdentity {
    /// Create an identity from the contents of a `.p8` key file
    pub fn new(key_pem: impl Into<Vec<u8>>) -> Self {
        Self {
            key_pem: Arc::from(key_pem.into()),
            key_id: String::new(),
            issuer: String::new(),
            bundle_id: String::new(),
            audience: None,
            issued_at_fn: None,
            expires_at_fn: None,
        }
    }

    /// Read the key from a `.p8` file on disk
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeyFile`] if the file cannot be read. The contents are
    /// not validated until the first mint.
    pub fn from_key_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| AuthError::KeyFile {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(bytes))
    }

    /// Private key ID from App Store Connect (the `kid` header)
    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = key_id.into();
        self
    }

    /// Issuer ID from the Keys page in App Store Connect (the `iss` claim)
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    /// App bundle ID (the `bid` claim)
    pub fn with_bundle_id(mut self, bundle_id: impl Into<String>) -> Self {
        self.bundle_id = bundle_id.into();
        self
    }

    /// Override the `aud` claim. Empty strings fall back to the default audience.
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        let audience = audience.into();
        self.audience = (!audience.is_empty()).then_some(audience);
        self
    }

    /// Override how `iat` is computed
    pub fn with_issued_at_fn(mut self, f: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        self.issued_at_fn = Some(Arc::new(f));
        self
    }

    /// Override how `exp` is computed. The result is also the cache expiry.
    pub fn with_expires_at_fn(mut self, f: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        self.expires_at_fn = Some(Arc::new(f));
        self
    }

    /// Key ID
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Issuer ID
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Bundle ID
    pub fn bundle_id(&self) -> &str {
        &self.bundle_id
    }

    /// Effective audience
    pub fn audience(&self) -> &str {
        self.audience.as_deref().unwrap_or(DEFAULT_AUDIENCE)
    }

    pub(crate) fn issued_at(&self, now: i64) -> i64 {
        self.issued_at_fn.as_ref().map_or(now, |f| f())
    }

    pub(crate) fn expires_at(&self, default: i64) -> i64 {
        self.expires_at_fn.as_ref().map_or(default, |f| f())
    }

    /// Decode the PEM and return the PKCS#8 DER of a P-256 key
    pub(crate) fn pkcs8_der(&self) -> Result<Vec<u8>> {
        let pem = std::str::from_utf8(&self.key_pem)
            .map_err(|_| AuthError::invalid_key("key file is not UTF-8 text"))?;
        let (label, document) = SecretDocument::from_pem(pem.trim())
            .map_err(|e| AuthError::invalid_key(format!("no PEM block found: {e}")))?;
        if label != "PRIVATE KEY" {
            return Err(AuthError::invalid_key(format!(
                "expected a PRIVATE KEY block, found {label}"
            )));
        }

        let info = PrivateKeyInfo::try_from(document.as_bytes())
            .map_err(|e| AuthError::invalid_key(format!("malformed PKCS#8 structure: {e}")))?;

        if info.algorithm.oid != EC_PUBLIC_KEY_OID {
            return Err(AuthError::UnsupportedKeyType {
                algorithm: info.algorithm.oid.to_string(),
            });
        }
        match info.algorithm.parameters_oid() {
            Ok(curve) if curve == P256_CURVE_OID => Ok(document.as_bytes().to_vec()),
            Ok(curve) => Err(AuthError::UnsupportedKeyType {
                algorithm: format!("EC curve {curve}"),
            }),
            Err(_) => Err(AuthError::UnsupportedKeyType {
                algorithm: "EC key without named curve".to_string(),
            }),
        }
    }
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("key_pem", &"[REDACTED]")
            .field("key_id", &self.key_id)
            .field("issuer", &self.issuer)
            .field("bundle_id", &self.bundle_id)
            .field("audience", &self.audience())
            .field("issued_at_fn", &self.issued_at_fn.is_some())
            .field("expires_at_fn", &self.expires_at_fn.is_some())
            .finish()
    }
}
