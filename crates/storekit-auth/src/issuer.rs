//! Cached bearer token issuance

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{AuthError, DEFAULT_TOKEN_LIFETIME_SECONDS, Result, SigningIdentity};

/// Claims carried by every bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerClaims {
    /// Issuer ID
    pub iss: String,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expiry (Unix seconds)
    pub exp: i64,
    /// Audience
    pub aud: String,
    /// Per-token random nonce
    pub nonce: String,
    /// Bundle ID
    pub bid: String,
}

enum TokenState {
    Uninitialized,
    Ready { bearer: String, expires_at: i64 },
}

/// Mints bearer tokens and reuses them until they expire
///
/// The whole check-and-mint sequence runs under one lock, so N concurrent callers
/// inside one expiry window produce exactly one mint.
pub struct TokenIssuer {
    identity: SigningIdentity,
    state: Mutex<TokenState>,
}

impl TokenIssuer {
    /// Create an issuer with an empty cache
    pub fn new(identity: SigningIdentity) -> Self {
        Self {
            identity,
            state: Mutex::new(TokenState::Uninitialized),
        }
    }

    /// The identity tokens are minted from
    pub fn identity(&self) -> &SigningIdentity {
        &self.identity
    }

    /// Return the cached token, minting a new one if none exists or it has expired
    ///
    /// A token is expired once the current time reaches its `exp`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidKeyMaterial`] if the key is not PKCS#8 PEM
    /// - [`AuthError::UnsupportedKeyType`] if the key is not P-256
    /// - [`AuthError::Signing`] if signing fails
    ///
    /// Failures leave the previous cache state untouched and are never retried here.
    pub fn generate_if_expired(&self) -> Result<String> {
        let now = unix_now()?;
        let mut state = self.state.lock();

        if let TokenState::Ready {
            bearer,
            expires_at,
        } = &*state
            && now < *expires_at
        {
            debug!(expires_in = expires_at - now, "Reusing cached bearer token");
            return Ok(bearer.clone());
        }

        let (bearer, expires_at) = self.mint(now)?;
        info!(
            kid = %self.identity.key_id(),
            expires_at,
            token_len = bearer.len(),
            "Minted new bearer token"
        );
        *state = TokenState::Ready {
            bearer: bearer.clone(),
            expires_at,
        };
        Ok(bearer)
    }

    /// Drop the cached token so the next call mints a fresh one
    pub fn invalidate(&self) {
        *self.state.lock() = TokenState::Uninitialized;
    }

    fn mint(&self, now: i64) -> Result<(String, i64)> {
        let der = self.identity.pkcs8_der()?;
        let key = EncodingKey::from_ec_der(&der);

        let claims = BearerClaims {
            iss: self.identity.issuer().to_string(),
            iat: self.identity.issued_at(now),
            exp: self
                .identity
                .expires_at(now + DEFAULT_TOKEN_LIFETIME_SECONDS),
            aud: self.identity.audience().to_string(),
            nonce: Uuid::new_v4().to_string(),
            bid: self.identity.bundle_id().to_string(),
        };

        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.identity.key_id().to_string());
        header.typ = Some("JWT".to_string());

        let bearer = encode(&header, &claims, &key)?;
        Ok((bearer, claims.exp))
    }
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cached = matches!(*self.state.lock(), TokenState::Ready { .. });
        f.debug_struct("TokenIssuer")
            .field("identity", &self.identity)
            .field("cached", &cached)
            .finish()
    }
}

fn unix_now() -> Result<i64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .map_err(|_| AuthError::Clock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicI64, Ordering};

    fn identity() -> SigningIdentity {
        let key = rcgen::KeyPair::generate().unwrap();
        SigningIdentity::new(key.serialize_pem())
            .with_key_id("2X9R4HXF34")
            .with_issuer("57246542-96fe-1a63-e053-0824d011072a")
            .with_bundle_id("com.example.app")
    }

    fn decode_part(token: &str, index: usize) -> serde_json::Value {
        let part = token.split('.').nth(index).unwrap();
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(part).unwrap()).unwrap()
    }

    #[test]
    fn test_token_shape() {
        let issuer = TokenIssuer::new(identity().with_issued_at_fn(|| 1_700_000_000));
        let token = issuer.generate_if_expired().unwrap();

        let header = decode_part(&token, 0);
        assert_eq!(header["alg"], "ES256");
        assert_eq!(header["kid"], "2X9R4HXF34");
        assert_eq!(header["typ"], "JWT");

        let claims: BearerClaims = serde_json::from_value(decode_part(&token, 1)).unwrap();
        assert_eq!(claims.iss, "57246542-96fe-1a63-e053-0824d011072a");
        assert_eq!(claims.iat, 1_700_000_000);
        assert_eq!(claims.aud, "appstoreconnect-v1");
        assert_eq!(claims.bid, "com.example.app");
        assert!(Uuid::parse_str(&claims.nonce).is_ok());
    }

    #[test]
    fn test_cached_within_window() {
        let issuer = TokenIssuer::new(identity());
        let first = issuer.generate_if_expired().unwrap();
        let second = issuer.generate_if_expired().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_expired_token_is_reminted_with_later_exp() {
        let now = unix_now().unwrap();
        // Every mint is already expired, one second later than the last.
        let next_exp = Arc::new(AtomicI64::new(now - 100));
        let counter = next_exp.clone();
        let issuer = TokenIssuer::new(
            identity().with_expires_at_fn(move || counter.fetch_add(1, Ordering::SeqCst)),
        );

        let first = issuer.generate_if_expired().unwrap();
        let second = issuer.generate_if_expired().unwrap();
        assert_ne!(first, second);

        let exp = |token: &str| decode_part(token, 1)["exp"].as_i64().unwrap();
        assert!(exp(&second) > exp(&first));
    }

    #[test]
    fn test_concurrent_callers_share_one_mint() {
        let issuer = Arc::new(TokenIssuer::new(identity()));
        let tokens: Vec<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let issuer = issuer.clone();
                    scope.spawn(move || issuer.generate_if_expired().unwrap())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(tokens.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_invalid_key_is_not_cached() {
        let issuer = TokenIssuer::new(SigningIdentity::new("garbage"));
        assert!(matches!(
            issuer.generate_if_expired(),
            Err(AuthError::InvalidKeyMaterial { .. })
        ));
        assert!(format!("{issuer:?}").contains("cached: false"));
    }

    #[test]
    fn test_invalidate_forces_new_token() {
        let issuer = TokenIssuer::new(identity());
        let first = issuer.generate_if_expired().unwrap();
        issuer.invalidate();
        let second = issuer.generate_if_expired().unwrap();
        assert_ne!(first, second);
    }
}
