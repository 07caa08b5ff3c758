//! Bearer token authentication stage

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use http::HeaderValue;
use http::header::AUTHORIZATION;
use storekit_auth::{AuthError, TokenIssuer};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{Execute, HttpError, Layer, Next, Request, Response};

/// Anything that can hand out a bearer token
pub trait TokenSource: Send + Sync {
    /// Current bearer token, minting one if needed
    ///
    /// # Errors
    ///
    /// Returns the source's minting failure.
    fn bearer_token(&self) -> Result<String, AuthError>;
}

impl TokenSource for TokenIssuer {
    fn bearer_token(&self) -> Result<String, AuthError> {
        self.generate_if_expired()
    }
}

/// Attach `Authorization: Bearer <token>` to every request
///
/// If no token can be obtained the request never reaches the transport.
#[derive(Clone)]
pub struct Authenticate {
    source: Arc<dyn TokenSource>,
}

impl Authenticate {
    /// Authenticate with tokens from `source`
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self { source }
    }
}

impl fmt::Debug for Authenticate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticate").finish_non_exhaustive()
    }
}

struct AuthenticateStage {
    source: Arc<dyn TokenSource>,
    next: Next,
}

impl Layer for Authenticate {
    fn wrap(&self, next: Next) -> Next {
        Arc::new(AuthenticateStage {
            source: self.source.clone(),
            next,
        })
    }
}

#[async_trait]
impl Execute for AuthenticateStage {
    async fn execute(
        &self,
        mut request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response, HttpError> {
        let token = self.source.bearer_token()?;
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| HttpError::InvalidRequest("bearer token is not a valid header".into()))?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);
        debug!(uri = %request.uri(), "Attached bearer token");
        self.next.execute(request, cancel).await
    }
}
