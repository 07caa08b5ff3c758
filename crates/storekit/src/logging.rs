//! Logging initialization
//!
//! The client only emits `tracing` events. Applications that do not install their
//! own subscriber can use [`LoggingConfig::init`]:
//!
//! ```rust,no_run
//! use storekit::LoggingConfig;
//!
//! LoggingConfig::default().init()?;
//! # Ok::<(), std::io::Error>(())
//! ```
//!
//! `RUST_LOG` takes precedence over the configured level.

use std::io;

use serde::{Deserialize, Serialize};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `storekit=debug,storekit_http=trace`
    pub level: String,
    /// Emit JSON lines instead of human readable output
    pub structured: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            structured: false,
        }
    }
}

impl LoggingConfig {
    /// Human readable output at `debug`
    pub fn verbose() -> Self {
        Self {
            level: "debug".to_string(),
            structured: false,
        }
    }

    /// JSON output at `info`
    pub fn json() -> Self {
        Self {
            level: "info".to_string(),
            structured: true,
        }
    }

    /// Install a global subscriber writing to stderr
    ///
    /// # Errors
    ///
    /// Returns an error if a global subscriber is already installed.
    pub fn init(&self) -> io::Result<()> {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));
        let subscriber = tracing_subscriber::registry().with(filter);

        if self.structured {
            subscriber
                .with(fmt::layer().json().with_writer(io::stderr))
                .try_init()
                .map_err(|e| io::Error::other(e.to_string()))
        } else {
            subscriber
                .with(fmt::layer().with_writer(io::stderr))
                .try_init()
                .map_err(|e| io::Error::other(e.to_string()))
        }
    }
}
