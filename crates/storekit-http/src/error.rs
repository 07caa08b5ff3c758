//! Error taxonomy for the request executor

use std::error::Error as StdError;
use std::io;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use storekit_auth::AuthError;
use thiserror::Error;

/// Boxed error used for pluggable codecs and transports
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors produced by pipeline stages and transports
#[derive(Error, Debug)]
pub enum HttpError {
    /// The response status is not in the stage's allow-list
    #[error("Received unexpected status code {status}")]
    UnexpectedStatus {
        /// Observed status
        status: StatusCode,
        /// Response headers
        headers: HeaderMap,
        /// Response body, kept so callers can parse error payloads
        body: Option<Bytes>,
    },

    /// A body was required but the response had none
    #[error("Response has no body")]
    EmptyResponseBody,

    /// The request body could not be encoded
    #[error("Failed to encode request body: {0}")]
    Encode(#[source] BoxError),

    /// The response body could not be decoded
    #[error("Failed to decode response body: {0}")]
    Decode(#[source] BoxError),

    /// The call was cancelled while waiting or in flight
    #[error("Request cancelled")]
    Cancelled,

    /// The retry policy gave up
    #[error("Retries exhausted for {uri}")]
    RetryTimeout {
        /// Request target
        uri: String,
    },

    /// The transport failed to deliver the request or read the response
    #[error("Transport error: {0}")]
    Transport(#[source] BoxError),

    /// No bearer token could be obtained
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The request could not be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl HttpError {
    /// Status code carried by the error, if any
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True if an unexpected end of stream appears anywhere in the source chain
    pub fn is_unexpected_eof(&self) -> bool {
        let mut source: Option<&(dyn StdError + 'static)> = Some(self);
        while let Some(err) = source {
            if let Some(io) = err.downcast_ref::<io::Error>()
                && io.kind() == io::ErrorKind::UnexpectedEof
            {
                return true;
            }
            source = err.source();
        }
        false
    }

    /// Wrap any transport failure
    pub fn transport(err: impl Into<BoxError>) -> Self {
        Self::Transport(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("wrapper")]
    struct Wrapper(#[source] io::Error);

    #[test]
    fn test_eof_found_through_chain() {
        let err = HttpError::transport(Wrapper(io::Error::from(io::ErrorKind::UnexpectedEof)));
        assert!(err.is_unexpected_eof());

        let err = HttpError::transport(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(!err.is_unexpected_eof());
    }

    #[test]
    fn test_status_only_for_unexpected_status() {
        let err = HttpError::UnexpectedStatus {
            status: StatusCode::TOO_MANY_REQUESTS,
            headers: HeaderMap::new(),
            body: None,
        };
        assert_eq!(err.status(), Some(StatusCode::TOO_MANY_REQUESTS));
        assert_eq!(HttpError::EmptyResponseBody.status(), None);
    }
}
