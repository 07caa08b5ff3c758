//! One-shot trust store assembly
//!
//! Initialization order:
//!
//! 1. Best-effort refresh: fetch the certificate index page, resolve every `.cer`
//!    link, download each into a freshly cleared working directory. Any failure is
//!    logged and the refresh is abandoned or the certificate skipped.
//! 2. Load the pool: pinned Apple root, configured extra roots, the bundle
//!    directory, then whatever the refresh left in the working directory.
//!
//! Both steps run exactly once per [`TrustStore`] no matter how many tasks call
//! [`TrustStore::init`] concurrently.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::bytes::Regex;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use url::Url;

use crate::{APPLE_CERTIFICATE_INDEX, CertificatePool, TrustError};

static CERT_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<a [^>]*href="([^"]+\.cer)""#).expect("certificate link pattern is valid")
});

/// Hosts certificates may be downloaded from besides the index host itself
const VENDOR_HOSTS: &[&str] = &["www.apple.com", "apple.com", "developer.apple.com"];

/// Trust store configuration
#[derive(Debug, Clone)]
pub struct TrustStoreConfig {
    /// Certificate index page. `None` disables the remote refresh.
    pub index_url: Option<Url>,
    /// Where downloaded certificates are written. Cleared on every refresh, so it
    /// must not be shared between processes; the default is per process.
    pub working_dir: PathBuf,
    /// Local directory of PEM or DER certificates loaded on every init
    pub bundle_dir: Option<PathBuf>,
    /// Additional PEM or DER roots supplied in memory
    pub extra_roots: Vec<Vec<u8>>,
    /// Timeout for each index or certificate request
    pub request_timeout: Duration,
}

impl Default for TrustStoreConfig {
    fn default() -> Self {
        Self {
            index_url: Url::parse(APPLE_CERTIFICATE_INDEX).ok(),
            working_dir: std::env::temp_dir()
                .join(format!("storekit-certs-{}", std::process::id())),
            bundle_dir: None,
            extra_roots: Vec::new(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl TrustStoreConfig {
    /// Only the pinned root and in-memory roots; no network, no disk
    pub fn offline() -> Self {
        Self {
            index_url: None,
            ..Self::default()
        }
    }

    /// Set the index page URL
    pub fn with_index_url(mut self, url: Url) -> Self {
        self.index_url = Some(url);
        self
    }

    /// Set the working directory for downloads
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    /// Set the bundled fallback directory
    pub fn with_bundle_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bundle_dir = Some(dir.into());
        self
    }

    /// Trust an additional PEM or DER root
    pub fn with_extra_root(mut self, cert: impl Into<Vec<u8>>) -> Self {
        self.extra_roots.push(cert.into());
        self
    }
}

/// Root certificate store, initialized once
#[derive(Debug)]
pub struct TrustStore {
    config: TrustStoreConfig,
    http_client: reqwest::Client,
    pool: OnceCell<CertificatePool>,
}

impl TrustStore {
    /// Create an uninitialized store
    pub fn new(config: TrustStoreConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    /// Create an uninitialized store that downloads with the given client
    pub fn with_client(config: TrustStoreConfig, http_client: reqwest::Client) -> Self {
        Self {
            config,
            http_client,
            pool: OnceCell::new(),
        }
    }

    /// Create a store that is already initialized with the given pool
    pub fn from_pool(pool: CertificatePool) -> Self {
        Self {
            config: TrustStoreConfig::offline(),
            http_client: reqwest::Client::new(),
            pool: OnceCell::new_with(Some(pool)),
        }
    }

    /// Assemble the pool, or return it if already assembled
    ///
    /// Never fails: the pinned root is always present, and refresh or bundle
    /// problems only shrink the pool.
    pub async fn init(&self) -> &CertificatePool {
        self.pool
            .get_or_init(|| async {
                if let Some(index_url) = &self.config.index_url
                    && let Err(e) = self.refresh(index_url).await
                {
                    warn!(error = %e, "Certificate refresh failed, using bundled roots");
                }
                let pool = self.load().await;
                info!(certificates = pool.len(), "Trust store initialized");
                pool
            })
            .await
    }

    /// The initialized pool
    ///
    /// # Errors
    ///
    /// Returns [`TrustError::NotInitialized`] before [`init`](Self::init) completes.
    pub fn certificate_pool(&self) -> Result<&CertificatePool, TrustError> {
        self.pool.get().ok_or(TrustError::NotInitialized)
    }

    /// Configuration in use
    pub fn config(&self) -> &TrustStoreConfig {
        &self.config
    }

    async fn refresh(&self, index_url: &Url) -> Result<(), TrustError> {
        info!(index = %index_url, "Refreshing certificates from index");
        let index_err = |reason: String| TrustError::Index {
            url: index_url.to_string(),
            reason,
        };

        let response = self
            .http_client
            .get(index_url.clone())
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|e| index_err(e.to_string()))?;
        if !response.status().is_success() {
            return Err(index_err(format!("status {}", response.status())));
        }
        let page = response
            .bytes()
            .await
            .map_err(|e| index_err(e.to_string()))?;

        let dir = &self.config.working_dir;
        reset_dir(dir).await?;

        let links = certificate_links(index_url, &page);
        debug!(links = links.len(), "Resolved certificate links");
        for link in links {
            if let Err(e) = self.download(&link, dir).await {
                warn!(error = %e, "Skipping certificate");
            }
        }
        Ok(())
    }

    async fn download(&self, url: &Url, dir: &Path) -> Result<(), TrustError> {
        let download_err = |reason: String| TrustError::Download {
            url: url.to_string(),
            reason,
        };

        let Some(file_name) = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty() && *name != "..")
        else {
            return Err(download_err("no file name in URL".to_string()));
        };

        let response = self
            .http_client
            .get(url.clone())
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|e| download_err(e.to_string()))?;
        if response.status() != reqwest::StatusCode::OK {
            debug!(url = %url, status = %response.status(), "Certificate not available");
            return Ok(());
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| download_err(e.to_string()))?;

        tokio::fs::write(dir.join(file_name), &body)
            .await
            .map_err(|e| download_err(e.to_string()))?;
        debug!(url = %url, bytes = body.len(), "Saved certificate");
        Ok(())
    }

    async fn load(&self) -> CertificatePool {
        let mut pool = CertificatePool::with_pinned_root();

        for root in &self.config.extra_roots {
            if pool.add_pem_or_der(root) == 0 {
                warn!("Ignoring configured root that is neither PEM nor DER");
            }
        }

        if let Some(bundle) = &self.config.bundle_dir {
            load_dir(&mut pool, bundle).await;
        }
        if self.config.index_url.is_some() {
            load_dir(&mut pool, &self.config.working_dir).await;
        }
        pool
    }
}

/// Extract `.cer` links and resolve them against the index page
///
/// Root-relative paths resolve against the index origin, absolute URLs are kept,
/// other paths are joined to the index URL. Links leaving the index host and the
/// vendor hosts are dropped.
pub(crate) fn certificate_links(index_url: &Url, page: &[u8]) -> Vec<Url> {
    CERT_LINK
        .captures_iter(page)
        .filter_map(|caps| {
            let href = std::str::from_utf8(caps.get(1)?.as_bytes()).ok()?;
            let url = index_url.join(href).ok()?;
            let host = url.host_str()?;
            let allowed = Some(host) == index_url.host_str() || VENDOR_HOSTS.contains(&host);
            if !allowed {
                warn!(url = %url, "Ignoring certificate link to foreign host");
                return None;
            }
            Some(url)
        })
        .collect()
}

async fn reset_dir(dir: &Path) -> Result<(), TrustError> {
    let dir_err = |source| TrustError::Directory {
        path: dir.to_path_buf(),
        source,
    };
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(dir_err(e)),
    }
    tokio::fs::create_dir_all(dir).await.map_err(dir_err)
}

async fn load_dir(pool: &mut CertificatePool, dir: &Path) {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(source) => {
            let e = TrustError::Directory {
                path: dir.to_path_buf(),
                source,
            };
            warn!(error = %e, "Skipping certificate directory");
            return;
        }
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
        if !is_file {
            continue;
        }
        let path = entry.path();
        let Ok(bytes) = tokio::fs::read(&path).await else {
            continue;
        };
        if pool.add_pem_or_der(&bytes) == 0 {
            debug!(path = %path.display(), "No new certificate in file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn index() -> Url {
        Url::parse("https://www.apple.com/certificateauthority/").unwrap()
    }

    #[test]
    fn test_default_working_dir_is_per_process() {
        let dir = TrustStoreConfig::default().working_dir;
        let name = dir.file_name().and_then(|n| n.to_str()).unwrap();
        assert_eq!(name, format!("storekit-certs-{}", std::process::id()));
        assert!(dir.starts_with(std::env::temp_dir()));
    }

    #[test]
    fn test_link_resolution() {
        let page = br#"
            <a class="x" href="/certificateauthority/AppleRootCA-G3.cer">G3</a>
            <a href="https://developer.apple.com/certificationauthority/AppleWWDRCA.cer">WWDR</a>
            <a href="AppleComputerRootCertificate.cer">Root</a>
            <a href="https://evil.example.com/root.cer">Evil</a>
            <a href="/certificateauthority/readme.pdf">Not a cert</a>
        "#;
        let links: Vec<String> = certificate_links(&index(), page)
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(
            links,
            vec![
                "https://www.apple.com/certificateauthority/AppleRootCA-G3.cer",
                "https://developer.apple.com/certificationauthority/AppleWWDRCA.cer",
                "https://www.apple.com/certificateauthority/AppleComputerRootCertificate.cer",
            ]
        );
    }

    #[tokio::test]
    async fn test_offline_store_has_pinned_root() {
        let store = TrustStore::new(TrustStoreConfig::offline());
        assert!(matches!(
            store.certificate_pool(),
            Err(TrustError::NotInitialized)
        ));
        assert_eq!(store.init().await.len(), 1);
        assert_eq!(store.certificate_pool().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_bundle_dir_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrustStore::new(
            TrustStoreConfig::offline().with_bundle_dir(dir.path().join("does-not-exist")),
        );
        assert_eq!(store.init().await.len(), 1);
    }
}
