//! Client error type

use std::time::Duration;

use http::StatusCode;
use http::header::RETRY_AFTER;
use serde::Deserialize;
use storekit_auth::AuthError;
use storekit_http::{HttpError, PaginationError};
use storekit_trust::{TrustError, VerifyError};
use thiserror::Error;

use crate::config::ConfigError;

/// Error body returned by the App Store Server API on failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status of the failed response
    pub status: StatusCode,
    /// Numeric error code, e.g. `4040010` for "transaction id not found"
    pub error_code: i64,
    /// Human readable message
    pub error_message: String,
    /// Server-requested pause before retrying
    pub retry_after: Option<Duration>,
}

impl ApiError {
    /// True for the "rate limit exceeded" family of codes
    pub fn is_rate_limited(&self) -> bool {
        self.status == StatusCode::TOO_MANY_REQUESTS || self.error_code == 4_290_000
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "App Store API error {} ({}): {}",
            self.error_code, self.status, self.error_message
        )
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error_code: i64,
    #[serde(default)]
    error_message: String,
}

/// Errors returned by [`StoreClient`](crate::StoreClient)
#[derive(Error, Debug)]
pub enum Error {
    /// Bearer token could not be minted
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A signed payload failed verification
    #[error(transparent)]
    Verify(#[from] VerifyError),

    /// The trust store could not be used
    #[error(transparent)]
    Trust(#[from] TrustError),

    /// The request executor failed
    #[error(transparent)]
    Http(HttpError),

    /// The API answered with its error body
    #[error("{0}")]
    Api(ApiError),

    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A paginated call failed after some pages had arrived
    #[error("Pagination failed after {pages_fetched} pages: {source}")]
    Pagination {
        /// Pages received before the failure
        pages_fetched: usize,
        /// The failure
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Status code of the failed response, if the failure carried one
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http(err) => err.status(),
            Self::Api(api) => Some(api.status),
            Self::Pagination { source, .. } => source.status(),
            _ => None,
        }
    }

    /// True if the call was cancelled
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Http(HttpError::Cancelled) => true,
            Self::Pagination { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// True for transient failures a caller may try again later
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(err) => storekit_http::should_retry_default(err.status(), Some(err)),
            Self::Api(api) => api.status.is_server_error() || api.is_rate_limited(),
            Self::Pagination { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

/// Non-2xx responses that carry the API's JSON error body become [`Error::Api`]
impl From<HttpError> for Error {
    fn from(err: HttpError) -> Self {
        if let HttpError::UnexpectedStatus {
            status,
            headers,
            body: Some(body),
        } = &err
            && let Ok(parsed) = serde_json::from_slice::<ErrorBody>(body)
        {
            let retry_after = headers
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Self::Api(ApiError {
                status: *status,
                error_code: parsed.error_code,
                error_message: parsed.error_message,
                retry_after,
            });
        }
        Self::Http(err)
    }
}

impl<P> From<PaginationError<P, Error>> for Error {
    fn from(err: PaginationError<P, Error>) -> Self {
        Self::Pagination {
            pages_fetched: err.pages.len(),
            source: Box::new(err.source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, HeaderValue};
    use pretty_assertions::assert_eq;

    fn unexpected(status: u16, body: Option<&'static str>, retry_after: Option<&'static str>) -> HttpError {
        let mut headers = HeaderMap::new();
        if let Some(value) = retry_after {
            headers.insert(RETRY_AFTER, HeaderValue::from_static(value));
        }
        HttpError::UnexpectedStatus {
            status: StatusCode::from_u16(status).unwrap(),
            headers,
            body: body.map(|b| b.as_bytes().to_vec().into()),
        }
    }

    #[test]
    fn test_error_body_becomes_api_error() {
        let err = Error::from(unexpected(
            404,
            Some(r#"{"errorCode":4040010,"errorMessage":"Transaction id not found."}"#),
            None,
        ));
        let Error::Api(api) = &err else {
            panic!("expected Api error, got {err:?}");
        };
        assert_eq!(api.status, StatusCode::NOT_FOUND);
        assert_eq!(api.error_code, 4_040_010);
        assert_eq!(api.error_message, "Transaction id not found.");
        assert_eq!(api.retry_after, None);
    }

    #[test]
    fn test_rate_limit_error_keeps_retry_after() {
        let err = Error::from(unexpected(
            429,
            Some(r#"{"errorCode":4290000,"errorMessage":"Rate limit exceeded."}"#),
            Some("30"),
        ));
        let Error::Api(api) = &err else {
            panic!("expected Api error, got {err:?}");
        };
        assert_eq!(api.retry_after, Some(Duration::from_secs(30)));
        assert!(api.is_rate_limited());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_non_json_body_stays_http_error() {
        let err = Error::from(unexpected(502, Some("<html>bad gateway</html>"), None));
        assert!(matches!(err, Error::Http(HttpError::UnexpectedStatus { .. })));
        assert_eq!(err.status(), Some(StatusCode::BAD_GATEWAY));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_pagination_error_counts_pages() {
        let err = Error::from(PaginationError {
            pages: vec![1, 2],
            source: Error::Http(HttpError::Cancelled),
        });
        assert!(matches!(err, Error::Pagination { pages_fetched: 2, .. }));
        assert!(err.is_cancelled());
    }
}
