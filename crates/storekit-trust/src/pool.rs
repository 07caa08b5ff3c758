//! The trusted root set

use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, TrustAnchor};
use tracing::debug;
use x509_cert::Certificate;
use x509_cert::der::Decode;

use crate::APPLE_ROOT_CA_G3_PEM;

/// An immutable set of trusted root certificates
///
/// Each certificate is kept both as DER and as a webpki trust anchor.
#[derive(Debug, Clone, Default)]
pub struct CertificatePool {
    certificates: Vec<CertificateDer<'static>>,
    anchors: Vec<TrustAnchor<'static>>,
}

impl CertificatePool {
    /// An empty pool. Nothing verifies against it.
    pub fn new() -> Self {
        Self::default()
    }

    /// A pool holding only the pinned Apple Root CA - G3
    pub fn with_pinned_root() -> Self {
        let mut pool = Self::new();
        pool.add_pem_or_der(APPLE_ROOT_CA_G3_PEM.as_bytes());
        pool
    }

    /// Add certificates from a PEM bundle, or from a single DER certificate if the
    /// input holds no PEM certificates. Returns how many were added.
    ///
    /// Input that is neither is ignored.
    pub fn add_pem_or_der(&mut self, bytes: &[u8]) -> usize {
        let pem: Vec<_> = CertificateDer::pem_slice_iter(bytes)
            .filter_map(Result::ok)
            .collect();
        if !pem.is_empty() {
            return pem.into_iter().filter(|der| self.add_der(der.clone())).count();
        }

        if Certificate::from_der(bytes).is_ok() {
            return usize::from(self.add_der(CertificateDer::from(bytes.to_vec())));
        }
        0
    }

    /// Add one DER certificate. Returns false for duplicates and unusable certificates.
    pub fn add_der(&mut self, der: CertificateDer<'static>) -> bool {
        if self.certificates.contains(&der) {
            return false;
        }
        let anchor = match webpki::anchor_from_trusted_cert(&der) {
            Ok(anchor) => anchor.to_owned(),
            Err(e) => {
                debug!(error = ?e, "Skipping certificate unusable as trust anchor");
                return false;
            }
        };
        self.anchors.push(anchor);
        self.certificates.push(der);
        true
    }

    /// Number of trusted certificates
    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    /// True when nothing is trusted
    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    /// DER encoded certificates
    pub fn certificates(&self) -> &[CertificateDer<'static>] {
        &self.certificates
    }

    /// Trust anchors for chain verification
    pub fn trust_anchors(&self) -> &[TrustAnchor<'static>] {
        &self.anchors
    }
}
