//! Request and response types flowing through the pipeline

use bytes::Bytes;

/// Outbound request
pub type Request = http::Request<Body>;

/// Inbound response. `None` means the transport produced no body.
pub type Response = http::Response<Option<Bytes>>;

/// Request body
///
/// Only [`Body::Empty`] and [`Body::Bytes`] can be replayed by the retry stage.
/// [`Body::OneShot`] marks a non-idempotent request that must reach the transport
/// at most once.
#[derive(Debug, Clone, Default)]
pub enum Body {
    /// No body
    #[default]
    Empty,
    /// Buffered, replayable body
    Bytes(Bytes),
    /// Buffered body that must not be replayed
    OneShot(Bytes),
}

impl Body {
    /// True if the retry stage may send this body again
    pub fn is_replayable(&self) -> bool {
        !matches!(self, Self::OneShot(_))
    }

    /// Body bytes, if any
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Empty => None,
            Self::Bytes(bytes) | Self::OneShot(bytes) => Some(bytes),
        }
    }

    /// Consume into bytes, if any
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            Self::Empty => None,
            Self::Bytes(bytes) | Self::OneShot(bytes) => Some(bytes),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

/// Copy a request for another attempt, or `None` if its body is not replayable
pub fn try_clone_request(request: &Request) -> Option<Request> {
    if !request.body().is_replayable() {
        return None;
    }
    let mut clone = http::Request::new(request.body().clone());
    *clone.method_mut() = request.method().clone();
    *clone.uri_mut() = request.uri().clone();
    *clone.version_mut() = request.version();
    *clone.headers_mut() = request.headers().clone();
    *clone.extensions_mut() = request.extensions().clone();
    Some(clone)
}
