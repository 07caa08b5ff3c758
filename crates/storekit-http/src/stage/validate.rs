//! Response status and body requirements

use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{Execute, HttpError, Layer, Next, Request, Response};

/// Fail with [`HttpError::EmptyResponseBody`] when the response has no body
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireBody;

/// Fail with [`HttpError::UnexpectedStatus`] unless the status is allowed
#[derive(Debug, Clone)]
pub struct RequireStatus {
    allowed: Vec<StatusCode>,
}

impl RequireStatus {
    /// Allow exactly these statuses. An empty list allows only 200.
    pub fn new(allowed: impl IntoIterator<Item = StatusCode>) -> Self {
        let mut allowed: Vec<_> = allowed.into_iter().collect();
        if allowed.is_empty() {
            allowed.push(StatusCode::OK);
        }
        Self { allowed }
    }

    /// Allowed statuses
    pub fn allowed(&self) -> &[StatusCode] {
        &self.allowed
    }
}

impl Default for RequireStatus {
    fn default() -> Self {
        Self::new([StatusCode::OK])
    }
}

struct RequireBodyStage {
    next: Next,
}

struct RequireStatusStage {
    allowed: Vec<StatusCode>,
    next: Next,
}

impl Layer for RequireBody {
    fn wrap(&self, next: Next) -> Next {
        Arc::new(RequireBodyStage { next })
    }
}

impl Layer for RequireStatus {
    fn wrap(&self, next: Next) -> Next {
        Arc::new(RequireStatusStage {
            allowed: self.allowed.clone(),
            next,
        })
    }
}

#[async_trait]
impl Execute for RequireBodyStage {
    async fn execute(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response, HttpError> {
        let response = self.next.execute(request, cancel).await?;
        if response.body().is_none() {
            return Err(HttpError::EmptyResponseBody);
        }
        Ok(response)
    }
}

#[async_trait]
impl Execute for RequireStatusStage {
    async fn execute(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response, HttpError> {
        let response = self.next.execute(request, cancel).await?;
        let status = response.status();
        if self.allowed.contains(&status) {
            return Ok(response);
        }
        debug!(status = %status, "Rejecting response status");
        let (parts, body) = response.into_parts();
        Err(HttpError::UnexpectedStatus {
            status,
            headers: parts.headers,
            body,
        })
    }
}
