//! # StoreKit HTTP
//!
//! Composable request executor for the App Store Server API client.
//!
//! A [`Pipeline`] is an ordered chain of stages in front of a transport. Every
//! stage and every transport implements [`Execute`]; a [`Layer`] describes a stage
//! and wraps the next executor when the pipeline is assembled.
//!
//! ## Stages
//!
//! - **Headers**: [`SetHeader`] replaces, [`AppendHeader`] adds
//! - **Authentication**: [`Authenticate`] attaches a bearer token
//! - **Validation**: [`RequireStatus`] and [`RequireBody`]
//! - **Codecs**: [`EncodeBody`] and [`DecodeBody`], JSON by default
//! - **Rate limiting**: [`RateLimit`] over a shared sliding-window [`RateLimiter`]
//! - **Retry**: [`Retry`] driven by a [`Backoff`] policy and a predicate
//!
//! [`Paginator`] drives "has more + cursor" pagination over any fetch closure.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use storekit_http::{
//!     Body, DecodeBody, Decoded, Execute, JitterBackoff, Pipeline, RequireBody, RequireStatus,
//!     ReqwestTransport, Retry,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), storekit_http::HttpError> {
//! let pipeline = Pipeline::builder()
//!     .layer(DecodeBody::<serde_json::Value>::json())
//!     .layer(Retry::new(JitterBackoff::default()))
//!     .layer(RequireStatus::default())
//!     .layer(RequireBody)
//!     .service(Arc::new(ReqwestTransport::default()));
//!
//! let request = http::Request::builder()
//!     .uri("https://api.storekit-sandbox.itunes.apple.com/inApps/v1/notifications/test")
//!     .body(Body::Empty)
//!     .map_err(|e| storekit_http::HttpError::InvalidRequest(e.to_string()))?;
//! let response = pipeline.execute(request, &CancellationToken::new()).await?;
//! let body = response.extensions().get::<Decoded<serde_json::Value>>();
//! # let _ = body;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod backoff;
mod body;
mod error;
mod paginate;
mod pipeline;
pub mod stage;
mod transport;

#[cfg(test)]
mod testing;

pub use backoff::{Backoff, ConstantBackoff, JitterBackoff};
pub use body::{Body, Request, Response, try_clone_request};
pub use error::{BoxError, HttpError};
pub use paginate::{Page, PaginationError, Paginator};
pub use pipeline::{Execute, Layer, Next, Pipeline, PipelineBuilder};
pub use stage::{
    AppendHeader, Authenticate, DecodeBody, Decoded, Decoder, EncodeBody, Encoder, Json,
    RateLimit, RateLimiter, RequireBody, RequireStatus, Retry, RetryPredicate, SetHeader,
    TokenSource, should_retry_default,
};
pub use transport::ReqwestTransport;

/// Result type for executor operations
pub type Result<T> = std::result::Result<T, HttpError>;
