//! Client configuration
//!
//! Load from a file (TOML, YAML or JSON) with environment overrides, from the
//! environment alone, or build programmatically:
//!
//! ```rust,no_run
//! use storekit::{Environment, StoreConfig};
//!
//! let config = StoreConfig::builder()
//!     .key_id("2X9R4HXF34")
//!     .issuer_id("57246542-96fe-1a63-e053-0824d011072a")
//!     .bundle_id("com.example.app")
//!     .private_key_path("/etc/storekit/SubscriptionKey_2X9R4HXF34.p8")
//!     .environment(Environment::Sandbox)
//!     .requests_per_minute(300)
//!     .build();
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use storekit_auth::SigningIdentity;
use storekit_http::JitterBackoff;
use storekit_trust::TrustStoreConfig;
use url::Url;

use crate::logging::LoggingConfig;
use crate::models::Environment;

/// Environment variable prefix; nested keys use `__`, e.g. `STOREKIT__HTTP__TIMEOUT_SECS`
pub const ENV_PREFIX: &str = "STOREKIT";

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Configuration parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),

    /// A required setting is absent
    #[error("Missing configuration value: {0}")]
    Missing(&'static str),

    /// A setting has an unusable value
    #[error("Invalid configuration value for {field}: {reason}")]
    Invalid {
        /// Setting name
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// Everything needed to build a [`StoreClient`](crate::StoreClient)
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Private key id from App Store Connect
    pub key_id: String,
    /// Issuer id from App Store Connect
    pub issuer_id: String,
    /// App bundle id
    pub bundle_id: String,
    /// Token audience; `appstoreconnect-v1` when unset
    pub audience: Option<String>,
    /// Which API host to call
    pub environment: Environment,
    /// Inline PKCS#8 PEM private key
    pub private_key: Option<String>,
    /// Path to a `.p8` private key file, used when `private_key` is unset
    pub private_key_path: Option<PathBuf>,
    /// Replaces the environment's host, e.g. for a proxy
    pub base_url: Option<Url>,
    /// Pause between page requests, milliseconds
    pub pagination_delay_ms: u64,
    /// Request executor settings
    pub http: HttpConfig,
    /// Trust store settings
    pub trust: TrustConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("key_id", &self.key_id)
            .field("issuer_id", &self.issuer_id)
            .field("bundle_id", &self.bundle_id)
            .field("audience", &self.audience)
            .field("environment", &self.environment)
            .field("private_key", &self.private_key.as_ref().map(|_| "[REDACTED]"))
            .field("private_key_path", &self.private_key_path)
            .field("base_url", &self.base_url)
            .field("pagination_delay_ms", &self.pagination_delay_ms)
            .field("http", &self.http)
            .field("trust", &self.trust)
            .field("logging", &self.logging)
            .finish()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            key_id: String::new(),
            issuer_id: String::new(),
            bundle_id: String::new(),
            audience: None,
            environment: Environment::Production,
            private_key: None,
            private_key_path: None,
            base_url: None,
            pagination_delay_ms: 10,
            http: HttpConfig::default(),
            trust: TrustConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Request executor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout, seconds
    pub timeout_secs: u64,
    /// `User-Agent` header
    pub user_agent: String,
    /// Client-side rate limit; unset or zero disables it
    pub requests_per_minute: Option<usize>,
    /// Retry policy
    pub retry: RetryConfig,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: concat!("storekit-rs/", env!("CARGO_PKG_VERSION")).to_string(),
            requests_per_minute: None,
            retry: RetryConfig::default(),
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retry transient failures
    pub enabled: bool,
    /// First backoff window, milliseconds
    pub initial_backoff_ms: u64,
    /// Backoff cap, milliseconds; retrying stops once the window passes it
    pub max_backoff_ms: u64,
    /// Window growth factor
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// The backoff policy, or `None` when retrying is disabled
    pub fn backoff(&self) -> Option<JitterBackoff> {
        self.enabled.then(|| {
            JitterBackoff::new(
                Duration::from_millis(self.initial_backoff_ms),
                Duration::from_millis(self.max_backoff_ms),
                self.multiplier,
            )
        })
    }
}

/// Trust store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    /// Download roots listed on the certificate index page
    pub refresh_from_index: bool,
    /// Index page; Apple's certificate authority page when unset
    pub index_url: Option<Url>,
    /// Download directory; a temp subdirectory when unset
    pub working_dir: Option<PathBuf>,
    /// Local directory of PEM or DER roots
    pub bundle_dir: Option<PathBuf>,
    /// Timeout for index and certificate downloads, seconds
    pub timeout_secs: u64,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            refresh_from_index: true,
            index_url: None,
            working_dir: None,
            bundle_dir: None,
            timeout_secs: 10,
        }
    }
}

impl TrustConfig {
    /// Trust store settings derived from this configuration
    pub fn store_config(&self) -> TrustStoreConfig {
        let mut config = TrustStoreConfig::default();
        if !self.refresh_from_index {
            config.index_url = None;
        } else if let Some(index_url) = &self.index_url {
            config.index_url = Some(index_url.clone());
        }
        if let Some(dir) = &self.working_dir {
            config.working_dir = dir.clone();
        }
        config.bundle_dir = self.bundle_dir.clone();
        config.request_timeout = Duration::from_secs(self.timeout_secs);
        config
    }
}

impl StoreConfig {
    /// Load configuration from a file (TOML, YAML, or JSON)
    ///
    /// The file format is auto-detected from the file extension. Environment
    /// variables with the `STOREKIT__` prefix override file settings, e.g.
    /// `STOREKIT__ENVIRONMENT=Sandbox`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file doesn't exist
    /// - The file format is unsupported
    /// - The file contains invalid configuration
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_prefix(path, ENV_PREFIX)
    }

    /// Load configuration from a file with a custom environment prefix
    ///
    /// # Errors
    ///
    /// Same as [`from_file`](Self::from_file).
    pub fn from_file_with_prefix(
        path: impl AsRef<Path>,
        env_prefix: &str,
    ) -> Result<Self, ConfigError> {
        use config::{Config, File, FileFormat};

        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml" | "yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => return Err(ConfigError::UnsupportedFormat),
        };

        let config = Config::builder()
            .add_source(File::new(
                path.to_str().ok_or(ConfigError::UnsupportedFormat)?,
                format,
            ))
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Load configuration from `STOREKIT__*` environment variables only
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ParseError`] if a variable has the wrong type.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Create a configuration builder
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder::new()
    }

    /// Check that the identity settings are present and the retry policy is usable
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] naming the first absent setting, or
    /// [`ConfigError::Invalid`] for a retry multiplier that is not finite and at least 1.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.key_id.is_empty() {
            return Err(ConfigError::Missing("key_id"));
        }
        if self.issuer_id.is_empty() {
            return Err(ConfigError::Missing("issuer_id"));
        }
        if self.bundle_id.is_empty() {
            return Err(ConfigError::Missing("bundle_id"));
        }
        if self.private_key.is_none() && self.private_key_path.is_none() {
            return Err(ConfigError::Missing("private_key or private_key_path"));
        }
        let multiplier = self.http.retry.multiplier;
        if self.http.retry.enabled && !(multiplier.is_finite() && multiplier >= 1.0) {
            return Err(ConfigError::Invalid {
                field: "http.retry.multiplier",
                reason: format!("{multiplier} is not a finite number of at least 1"),
            });
        }
        Ok(())
    }

    /// Signing identity for the bearer token issuer
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] for absent settings and the key file's read
    /// error if `private_key_path` cannot be read.
    pub fn signing_identity(&self) -> crate::Result<SigningIdentity> {
        self.validate()?;
        let identity = match (&self.private_key, &self.private_key_path) {
            (Some(pem), _) => SigningIdentity::new(pem.as_bytes()),
            (None, Some(path)) => SigningIdentity::from_key_file(path)?,
            (None, None) => return Err(ConfigError::Missing("private_key").into()),
        };
        let mut identity = identity
            .with_key_id(&self.key_id)
            .with_issuer(&self.issuer_id)
            .with_bundle_id(&self.bundle_id);
        if let Some(audience) = &self.audience {
            identity = identity.with_audience(audience);
        }
        Ok(identity)
    }

    /// API base URL: the override, or the environment's host
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the host constant cannot be parsed.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        match &self.base_url {
            Some(url) => Ok(url.clone()),
            None => Url::parse(self.environment.host()).map_err(|e| ConfigError::Invalid {
                field: "environment",
                reason: e.to_string(),
            }),
        }
    }
}

/// Configuration builder
#[derive(Debug)]
pub struct StoreConfigBuilder {
    config: StoreConfig,
}

impl Default for StoreConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreConfigBuilder {
    /// Create a new configuration builder
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: StoreConfig::default(),
        }
    }

    /// Set the key id
    pub fn key_id(mut self, key_id: impl Into<String>) -> Self {
        self.config.key_id = key_id.into();
        self
    }

    /// Set the issuer id
    pub fn issuer_id(mut self, issuer_id: impl Into<String>) -> Self {
        self.config.issuer_id = issuer_id.into();
        self
    }

    /// Set the bundle id
    pub fn bundle_id(mut self, bundle_id: impl Into<String>) -> Self {
        self.config.bundle_id = bundle_id.into();
        self
    }

    /// Set the token audience
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.config.audience = Some(audience.into());
        self
    }

    /// Set the environment
    pub fn environment(mut self, environment: Environment) -> Self {
        self.config.environment = environment;
        self
    }

    /// Use an inline PEM private key
    pub fn private_key(mut self, pem: impl Into<String>) -> Self {
        self.config.private_key = Some(pem.into());
        self
    }

    /// Read the private key from a `.p8` file
    pub fn private_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.private_key_path = Some(path.into());
        self
    }

    /// Replace the API host
    pub fn base_url(mut self, url: Url) -> Self {
        self.config.base_url = Some(url);
        self
    }

    /// Set the pause between page requests
    pub fn pagination_delay(mut self, delay: Duration) -> Self {
        self.config.pagination_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the per-request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.http.timeout_secs = timeout.as_secs();
        self
    }

    /// Set the `User-Agent` header
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.http.user_agent = user_agent.into();
        self
    }

    /// Limit requests per rolling minute
    pub fn requests_per_minute(mut self, limit: usize) -> Self {
        self.config.http.requests_per_minute = Some(limit);
        self
    }

    /// Set the retry policy
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.http.retry = retry;
        self
    }

    /// Never retry
    pub fn disable_retry(mut self) -> Self {
        self.config.http.retry.enabled = false;
        self
    }

    /// Set the trust store settings
    pub fn trust(mut self, trust: TrustConfig) -> Self {
        self.config.trust = trust;
        self
    }

    /// Set the logging settings
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.config.logging = logging;
        self
    }

    /// Build the configuration
    pub fn build(self) -> StoreConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.pagination_delay_ms, 10);
        assert_eq!(config.http.timeout_secs, 30);
        assert!(config.http.retry.enabled);
        assert!(config.trust.refresh_from_index);
        assert_eq!(
            config.base_url().unwrap().as_str(),
            "https://api.storekit.itunes.apple.com/"
        );
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
key_id = "2X9R4HXF34"
issuer_id = "57246542-96fe-1a63-e053-0824d011072a"
bundle_id = "com.example.app"
environment = "Sandbox"
private_key_path = "/keys/key.p8"
pagination_delay_ms = 50

[http]
requests_per_minute = 120

[http.retry]
enabled = false

[trust]
refresh_from_index = false
bundle_dir = "/etc/storekit/roots"
"#
        )
        .unwrap();

        let config = StoreConfig::from_file(file.path()).unwrap();
        assert_eq!(config.key_id, "2X9R4HXF34");
        assert_eq!(config.environment, Environment::Sandbox);
        assert_eq!(config.pagination_delay_ms, 50);
        assert_eq!(config.http.requests_per_minute, Some(120));
        assert_eq!(config.http.timeout_secs, 30);
        assert!(config.http.retry.backoff().is_none());

        let trust = config.trust.store_config();
        assert_eq!(trust.index_url, None);
        assert_eq!(trust.bundle_dir, Some(PathBuf::from("/etc/storekit/roots")));
        assert_eq!(
            config.base_url().unwrap().as_str(),
            "https://api.storekit-sandbox.itunes.apple.com/"
        );
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"key_id":"K","issuer_id":"I","bundle_id":"B","private_key":"pem"}}"#
        )
        .unwrap();
        let config = StoreConfig::from_file(file.path()).unwrap();
        assert_eq!(config.private_key.as_deref(), Some("pem"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_and_unsupported_files() {
        assert!(matches!(
            StoreConfig::from_file("/definitely/not/here.toml"),
            Err(ConfigError::FileNotFound(_))
        ));

        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(matches!(
            StoreConfig::from_file(file.path()),
            Err(ConfigError::UnsupportedFormat)
        ));
    }

    #[test]
    fn test_validate_names_missing_field() {
        let config = StoreConfig::builder().key_id("K").issuer_id("I").build();
        assert!(matches!(config.validate(), Err(ConfigError::Missing("bundle_id"))));

        let config = StoreConfig::builder()
            .key_id("K")
            .issuer_id("I")
            .bundle_id("B")
            .build();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing("private_key or private_key_path"))
        ));
    }

    #[test]
    fn test_validate_rejects_unusable_multiplier() {
        let base = || {
            StoreConfig::builder()
                .key_id("K")
                .issuer_id("I")
                .bundle_id("B")
                .private_key("PEM")
        };
        for multiplier in [f64::INFINITY, f64::NAN, 0.5] {
            let config = base()
                .retry(RetryConfig {
                    multiplier,
                    ..RetryConfig::default()
                })
                .build();
            assert!(
                matches!(
                    config.validate(),
                    Err(ConfigError::Invalid {
                        field: "http.retry.multiplier",
                        ..
                    })
                ),
                "{multiplier}"
            );
        }

        let disabled = base()
            .retry(RetryConfig {
                enabled: false,
                multiplier: f64::INFINITY,
                ..RetryConfig::default()
            })
            .build();
        assert!(disabled.validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let config = StoreConfig::builder().private_key("SECRET-PEM").build();
        let debug = format!("{config:?}");
        assert!(!debug.contains("SECRET-PEM"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_builder() {
        let config = StoreConfig::builder()
            .environment(Environment::Sandbox)
            .requests_per_minute(10)
            .pagination_delay(Duration::from_millis(250))
            .disable_retry()
            .build();
        assert_eq!(config.http.requests_per_minute, Some(10));
        assert_eq!(config.pagination_delay_ms, 250);
        assert!(!config.http.retry.enabled);
    }
}
