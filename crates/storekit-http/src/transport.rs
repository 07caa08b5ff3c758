//! reqwest-backed base transport

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{Execute, HttpError, Request, Response};

/// Sends requests with a shared [`reqwest::Client`]
///
/// Response bodies are read fully; an empty body is reported as `None`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Use an existing client
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Build a client with a per-request timeout
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Transport`] if the TLS backend cannot be initialized.
    pub fn with_timeout(timeout: Duration) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(HttpError::transport)?;
        Ok(Self { client })
    }

    async fn send(&self, request: Request) -> Result<Response, reqwest::Error> {
        let (parts, body) = request.into_parts();
        let mut builder = self
            .client
            .request(parts.method, parts.uri.to_string())
            .headers(parts.headers);
        if let Some(bytes) = body.into_bytes() {
            builder = builder.body(bytes);
        }

        let response = builder.send().await?;
        let mut out = http::Response::new(None);
        *out.status_mut() = response.status();
        *out.version_mut() = response.version();
        *out.headers_mut() = response.headers().clone();

        let bytes = response.bytes().await?;
        trace!(bytes = bytes.len(), "Read response body");
        *out.body_mut() = (!bytes.is_empty()).then_some(bytes);
        Ok(out)
    }
}

#[async_trait]
impl Execute for ReqwestTransport {
    async fn execute(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response, HttpError> {
        let method = request.method().clone();
        let uri = request.uri().clone();

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(HttpError::Cancelled),
            response = self.send(request) => response.map_err(HttpError::transport)?,
        };
        debug!(method = %method, uri = %uri, status = %response.status(), "HTTP exchange complete");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Body;
    use bytes::Bytes;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_round_trip_through_reqwest() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/inApps/v1/notifications/test"))
            .and(header("content-type", "application/json"))
            .and(body_string("{}"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"testNotificationToken\":\"t\"}"))
            .mount(&server)
            .await;

        let request = http::Request::builder()
            .method("POST")
            .uri(format!("{}/inApps/v1/notifications/test", server.uri()))
            .header("content-type", "application/json")
            .body(Body::Bytes(Bytes::from_static(b"{}")))
            .unwrap();
        let response = ReqwestTransport::default()
            .execute(request, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(
            response.body().as_deref(),
            Some(&b"{\"testNotificationToken\":\"t\"}"[..])
        );
    }

    #[tokio::test]
    async fn test_empty_body_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let request = http::Request::builder()
            .uri(server.uri())
            .body(Body::Empty)
            .unwrap();
        let response = ReqwestTransport::default()
            .execute(request, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.status(), 204);
        assert!(response.body().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_before_send() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let request = http::Request::builder()
            .uri("http://127.0.0.1:9/")
            .body(Body::Empty)
            .unwrap();
        let err = ReqwestTransport::default()
            .execute(request, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Cancelled));
    }
}
