//! Pipeline stages
//!
//! Each public type here is a [`Layer`](crate::Layer): configuration that wraps the
//! next executor in a private stage when the pipeline is built.

mod auth;
mod codec;
mod header;
mod rate_limit;
mod retry;
mod validate;

pub use auth::{Authenticate, TokenSource};
pub use codec::{DecodeBody, Decoded, Decoder, EncodeBody, Encoder, Json};
pub use header::{AppendHeader, SetHeader};
pub use rate_limit::{RateLimit, RateLimiter};
pub use retry::{Retry, RetryPredicate, should_retry_default};
pub use validate::{RequireBody, RequireStatus};
