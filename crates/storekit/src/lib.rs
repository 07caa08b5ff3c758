//! # StoreKit - App Store Server API Client
//!
//! Calls the App Store Server API and verifies the signed payloads it returns or
//! pushes (transactions, renewal info, server notifications).
//!
//! ## Architecture
//!
//! - [`storekit_auth`] mints and caches the ES256 bearer tokens every call carries
//! - [`storekit_trust`] assembles the trusted roots and verifies `x5c`-signed payloads
//! - [`storekit_http`] composes the request pipeline: headers, authentication,
//!   validation, JSON codecs, rate limiting, retry and pagination
//! - this crate wires them into [`StoreClient`], with the endpoint catalogue, the
//!   request and response models, configuration loading and logging setup
//!
//! ## Example
//!
//! ```rust,no_run
//! use storekit::{StoreClient, StoreConfig, TransactionHistoryQuery};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StoreConfig::from_file("storekit.toml")?;
//! config.logging.init()?;
//!
//! let client = StoreClient::from_config(&config)?;
//! let pages = client
//!     .get_transaction_history("1000000000000001", &TransactionHistoryQuery::default())
//!     .await?;
//! for page in &pages {
//!     for transaction in client.parse_signed_transactions(&page.signed_transactions[..]).await {
//!         println!("{} {}", transaction.transaction_id, transaction.product_id);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
#![deny(unsafe_code)]

mod client;
pub mod config;
mod endpoint;
mod error;
pub mod logging;
pub mod models;
mod signed;

pub use client::{StoreClient, StoreClientBuilder};
pub use config::{
    ConfigError, ENV_PREFIX, HttpConfig, RetryConfig, StoreConfig, StoreConfigBuilder,
    TrustConfig,
};
pub use endpoint::{PRODUCTION_HOST, SANDBOX_HOST};
pub use error::{ApiError, Error};
pub use logging::LoggingConfig;
pub use models::*;

pub use storekit_auth::{AuthError, SigningIdentity, TokenIssuer};
pub use storekit_http::{HttpError, JitterBackoff, PaginationError};
pub use storekit_trust::{TrustError, TrustStore, TrustStoreConfig, VerifyError};

/// Result type for client operations
pub type Result<T> = std::result::Result<T, Error>;
