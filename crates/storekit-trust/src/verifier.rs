//! x5c chain walk and ES256 signature check for compact JWS payloads

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use p256::PublicKey;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::DecodePublicKey;
use rustls_pki_types::{CertificateDer, UnixTime};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use webpki::{EndEntityCert, KeyUsage};
use x509_cert::Certificate;
use x509_cert::der::{Decode, Encode};
use x509_cert::der::asn1::ObjectIdentifier;

use crate::{TrustStore, VerifyError};

/// id-ecPublicKey
const EC_PUBLIC_KEY_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");

/// base64url that accepts both padded and unpadded input
const URL_SAFE_INDIFFERENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Deserialize)]
struct JwsHeader {
    #[serde(default)]
    alg: Option<String>,
    #[serde(default)]
    x5c: Vec<String>,
}

/// Verifies App Store signed payloads against a [`TrustStore`]
///
/// Stateless apart from the shared store: nothing about a token is cached, so
/// verifying the same token twice does the full work twice.
#[derive(Debug, Clone)]
pub struct SignedPayloadVerifier {
    trust: Arc<TrustStore>,
    verification_time: Option<Duration>,
}

impl SignedPayloadVerifier {
    /// Verify against the store's pool at the current time
    pub fn new(trust: Arc<TrustStore>) -> Self {
        Self {
            trust,
            verification_time: None,
        }
    }

    /// Check certificate validity at a fixed instant instead of now
    ///
    /// Useful for payloads stored long ago whose chain has since expired.
    pub fn with_verification_time(mut self, at: SystemTime) -> Self {
        self.verification_time = Some(at.duration_since(UNIX_EPOCH).unwrap_or_default());
        self
    }

    /// The store roots come from
    pub fn trust_store(&self) -> &Arc<TrustStore> {
        &self.trust
    }

    /// Walk the `x5c` chain to a trusted root and return the leaf's public key
    ///
    /// # Errors
    ///
    /// - [`VerifyError::MalformedToken`] for fewer than three segments or an undecodable header
    /// - [`VerifyError::MissingCertificateChain`] for an empty or absent `x5c`
    /// - [`VerifyError::InvalidCertificate`] naming the chain position that fails to parse
    /// - [`VerifyError::UnsupportedKeyType`] if the leaf key is not P-256
    /// - [`VerifyError::ChainVerificationFailed`] if no path reaches a trusted root
    /// - [`VerifyError::Trust`] if the store is not initialized
    pub fn extract_public_key(&self, token: &str) -> Result<PublicKey, VerifyError> {
        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() < 3 {
            return Err(VerifyError::malformed(format!(
                "expected 3 segments, found {}",
                segments.len()
            )));
        }

        let header_bytes = URL_SAFE_INDIFFERENT
            .decode(segments[0])
            .map_err(|e| VerifyError::malformed(format!("header is not base64url: {e}")))?;
        let header: JwsHeader = serde_json::from_slice(&header_bytes)
            .map_err(|e| VerifyError::malformed(format!("header is not JSON: {e}")))?;
        if header.x5c.is_empty() {
            return Err(VerifyError::MissingCertificateChain);
        }

        let chain = header
            .x5c
            .iter()
            .enumerate()
            .map(|(position, encoded)| parse_certificate(position, encoded))
            .collect::<Result<Vec<_>, _>>()?;
        let (leaf_der, leaf) = &chain[0];

        let spki = &leaf.tbs_certificate.subject_public_key_info;
        if spki.algorithm.oid != EC_PUBLIC_KEY_OID {
            return Err(VerifyError::UnsupportedKeyType);
        }
        let public_key = spki
            .to_der()
            .ok()
            .and_then(|der| PublicKey::from_public_key_der(&der).ok())
            .ok_or(VerifyError::UnsupportedKeyType)?;

        let pool = self.trust.certificate_pool()?;
        let intermediates: Vec<CertificateDer<'static>> =
            chain[1..].iter().map(|(der, _)| der.clone()).collect();

        let end_entity = EndEntityCert::try_from(leaf_der).map_err(|e| {
            VerifyError::InvalidCertificate {
                position: 0,
                reason: e.to_string(),
            }
        })?;
        end_entity
            .verify_for_usage(
                webpki::ALL_VERIFICATION_ALGS,
                pool.trust_anchors(),
                &intermediates,
                self.now(),
                KeyUsage::server_auth(),
                None,
                None,
            )
            .map_err(VerifyError::ChainVerificationFailed)?;

        debug!(
            alg = header.alg.as_deref().unwrap_or("none"),
            chain_len = chain.len(),
            "Certificate chain verified"
        );
        Ok(public_key)
    }

    /// Verify the chain and the signature, then decode the payload into `T`
    ///
    /// Only ES256 is accepted. Registered claims such as `exp` and `aud` are not
    /// enforced; App Store payloads carry their own timestamps.
    ///
    /// # Errors
    ///
    /// Everything [`extract_public_key`](Self::extract_public_key) returns, plus
    /// [`VerifyError::SignatureInvalid`] when the signature or algorithm does not match
    /// and [`VerifyError::MalformedToken`] when the payload does not decode into `T`.
    pub fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T, VerifyError> {
        let public_key = self.extract_public_key(token)?;
        let point = public_key.to_encoded_point(false);
        let key = DecodingKey::from_ec_der(point.as_bytes());

        let mut validation = Validation::new(Algorithm::ES256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        decode::<T>(token, &key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidToken
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_) => VerifyError::malformed(e.to_string()),
                _ => VerifyError::SignatureInvalid(e),
            })
    }

    fn now(&self) -> UnixTime {
        match self.verification_time {
            Some(at) => UnixTime::since_unix_epoch(at),
            None => UnixTime::now(),
        }
    }
}

/// Decode the payload segment without any verification
///
/// Only for routing a token to the right claims type before [`SignedPayloadVerifier::verify`].
///
/// # Errors
///
/// Returns [`VerifyError::MalformedToken`] if the token has fewer than three segments or the
/// payload is not base64url JSON.
pub fn decode_payload_unverified(token: &str) -> Result<serde_json::Value, VerifyError> {
    let mut segments = token.split('.');
    let (Some(_), Some(payload), Some(_)) = (segments.next(), segments.next(), segments.next())
    else {
        return Err(VerifyError::malformed("expected header.payload.signature"));
    };
    let bytes = URL_SAFE_INDIFFERENT
        .decode(payload)
        .map_err(|e| VerifyError::malformed(format!("payload is not base64url: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| VerifyError::malformed(format!("payload is not JSON: {e}")))
}

fn parse_certificate(
    position: usize,
    encoded: &str,
) -> Result<(CertificateDer<'static>, Certificate), VerifyError> {
    let invalid = |reason: String| VerifyError::InvalidCertificate { position, reason };
    let der = STANDARD
        .decode(encoded)
        .map_err(|e| invalid(format!("not base64: {e}")))?;
    let cert = Certificate::from_der(&der).map_err(|e| invalid(e.to_string()))?;
    Ok((CertificateDer::from(der), cert))
}
