//! Synthetic PKI for tests
//!
//! Generates a root, an intermediate and a P-256 leaf, and signs compact tokens
//! whose `x5c` header carries the chain the way App Store payloads do.
//! Not for production use.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use rcgen::{BasicConstraints, Certificate, CertificateParams, DnType, IsCa, KeyPair};
use serde::Serialize;

/// Root, intermediate and leaf certificates with their keys
#[allow(missing_debug_implementations)]
pub struct TestPki {
    root: Certificate,
    intermediate: Certificate,
    leaf: Certificate,
    leaf_key: KeyPair,
}

impl TestPki {
    /// Generate a fresh chain
    ///
    /// # Panics
    ///
    /// Panics if key or certificate generation fails.
    pub fn generate() -> Self {
        let root_key = KeyPair::generate().expect("root key");
        let root = ca_params("StoreKit Test Root CA")
            .self_signed(&root_key)
            .expect("root certificate");

        let intermediate_key = KeyPair::generate().expect("intermediate key");
        let intermediate = ca_params("StoreKit Test Intermediate CA")
            .signed_by(&intermediate_key, &root, &root_key)
            .expect("intermediate certificate");

        let leaf_key = KeyPair::generate().expect("leaf key");
        let mut leaf_params = CertificateParams::new(Vec::<String>::new()).expect("leaf params");
        leaf_params
            .distinguished_name
            .push(DnType::CommonName, "StoreKit Test Signing");
        let leaf = leaf_params
            .signed_by(&leaf_key, &intermediate, &intermediate_key)
            .expect("leaf certificate");

        Self {
            root,
            intermediate,
            leaf,
            leaf_key,
        }
    }

    /// Root certificate, DER
    pub fn root_der(&self) -> Vec<u8> {
        self.root.der().to_vec()
    }

    /// Root certificate, PEM
    pub fn root_pem(&self) -> String {
        self.root.pem()
    }

    /// The `x5c` chain: leaf, intermediate, root
    pub fn x5c(&self) -> Vec<String> {
        [&self.leaf, &self.intermediate, &self.root]
            .iter()
            .map(|cert| STANDARD.encode(cert.der()))
            .collect()
    }

    /// Sign `claims` with the leaf key, embedding the full chain
    pub fn sign<T: Serialize>(&self, claims: &T) -> String {
        self.sign_with_chain(claims, self.x5c())
    }

    /// Sign `claims` with the leaf key, embedding an arbitrary chain
    ///
    /// # Panics
    ///
    /// Panics if signing fails.
    pub fn sign_with_chain<T: Serialize>(&self, claims: &T, x5c: Vec<String>) -> String {
        let mut header = Header::new(Algorithm::ES256);
        header.x5c = Some(x5c);
        let key = EncodingKey::from_ec_der(&self.leaf_key.serialize_der());
        encode(&header, claims, &key).expect("token signing")
    }
}

fn ca_params(common_name: &str) -> CertificateParams {
    let mut params = CertificateParams::new(Vec::<String>::new()).expect("CA params");
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);
    params
}
