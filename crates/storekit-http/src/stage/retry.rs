//! Retry with backoff

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backoff::{Backoff, JitterBackoff};
use crate::{Execute, HttpError, Layer, Next, Request, Response, try_clone_request};

/// Decides whether an attempt should be repeated
///
/// Receives the status of the attempt (from the response, or from an
/// [`HttpError::UnexpectedStatus`]) and the error, if the attempt failed.
pub type RetryPredicate = Arc<dyn Fn(Option<StatusCode>, Option<&HttpError>) -> bool + Send + Sync>;

/// Retry on any 5xx, on 429, and on an unexpected end of stream anywhere in the
/// error chain
pub fn should_retry_default(status: Option<StatusCode>, error: Option<&HttpError>) -> bool {
    if let Some(status) = status
        && (status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS)
    {
        return true;
    }
    error.is_some_and(HttpError::is_unexpected_eof)
}

/// Repeat failed attempts with pauses drawn from a backoff policy
///
/// Each call starts from a fresh copy of the backoff prototype. Requests whose body
/// is not replayable are sent once and their outcome returned as is. When the
/// policy signals stop the call fails with [`HttpError::RetryTimeout`].
#[derive(Clone)]
pub struct Retry<B = JitterBackoff> {
    backoff: B,
    predicate: RetryPredicate,
}

impl<B: Backoff + Clone + 'static> Retry<B> {
    /// Retry with `backoff` and the default predicate
    pub fn new(backoff: B) -> Self {
        Self {
            backoff,
            predicate: Arc::new(should_retry_default),
        }
    }

    /// Replace the retry predicate
    pub fn with_predicate(
        mut self,
        predicate: impl Fn(Option<StatusCode>, Option<&HttpError>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.predicate = Arc::new(predicate);
        self
    }
}

impl<B: fmt::Debug> fmt::Debug for Retry<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retry")
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

struct RetryStage<B> {
    backoff: B,
    predicate: RetryPredicate,
    next: Next,
}

impl<B: Backoff + Clone + 'static> Layer for Retry<B> {
    fn wrap(&self, next: Next) -> Next {
        Arc::new(RetryStage {
            backoff: self.backoff.clone(),
            predicate: self.predicate.clone(),
            next,
        })
    }
}

#[async_trait]
impl<B: Backoff + Clone + 'static> Execute for RetryStage<B> {
    async fn execute(
        &self,
        mut request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response, HttpError> {
        let mut backoff = self.backoff.clone();
        let mut pause = Duration::ZERO;
        let mut attempt = 0u32;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(HttpError::Cancelled),
                () = tokio::time::sleep(pause) => {}
            }

            attempt += 1;
            let replay = try_clone_request(&request);
            let uri = request.uri().to_string();
            let result = self.next.execute(request, cancel).await;

            let Some(again) = replay else {
                return result;
            };
            let (status, error) = match &result {
                Ok(response) => (Some(response.status()), None),
                Err(err) => (err.status(), Some(err)),
            };
            if !(self.predicate)(status, error) {
                return result;
            }

            match backoff.next_pause() {
                Some(next_pause) => {
                    debug!(
                        uri = %uri,
                        attempt,
                        status = ?status,
                        pause_ms = next_pause.as_millis(),
                        "Retrying request"
                    );
                    pause = next_pause;
                    request = again;
                }
                None => {
                    warn!(uri = %uri, attempts = attempt, "Retry budget exhausted");
                    return Err(HttpError::RetryTimeout { uri });
                }
            }
        }
    }
}
