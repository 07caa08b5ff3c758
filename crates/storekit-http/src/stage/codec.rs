//! Request body encoding and response body decoding

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::HeaderValue;
use http::header::CONTENT_TYPE;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::{Body, BoxError, Execute, HttpError, Layer, Next, Request, Response};

/// Serializes request bodies
pub trait Encoder: Send + Sync + 'static {
    /// Content type of the encoded bytes
    fn content_type(&self) -> &'static str;

    /// Encode `value`
    ///
    /// # Errors
    ///
    /// Returns the serializer's failure.
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Bytes, BoxError>;
}

/// Deserializes response bodies
pub trait Decoder: Send + Sync + 'static {
    /// Decode `bytes` into `T`
    ///
    /// # Errors
    ///
    /// Returns the deserializer's failure.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, BoxError>;
}

/// JSON codec
#[derive(Debug, Clone, Copy, Default)]
pub struct Json;

impl Encoder for Json {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Bytes, BoxError> {
        Ok(Bytes::from(serde_json::to_vec(value)?))
    }
}

impl Decoder for Json {
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, BoxError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Encode a value into the request body and set `Content-Type`
pub struct EncodeBody<T, E = Json> {
    value: Arc<T>,
    encoder: Arc<E>,
    one_shot: bool,
}

impl<T> EncodeBody<T, Json>
where
    T: Serialize + Send + Sync + 'static,
{
    /// Encode `value` as JSON
    pub fn json(value: T) -> Self {
        Self::with_encoder(value, Json)
    }
}

impl<T, E> EncodeBody<T, E>
where
    T: Serialize + Send + Sync + 'static,
    E: Encoder,
{
    /// Encode `value` with `encoder`
    pub fn with_encoder(value: T, encoder: E) -> Self {
        Self {
            value: Arc::new(value),
            encoder: Arc::new(encoder),
            one_shot: false,
        }
    }

    /// Mark the body non-replayable so the retry stage sends it at most once
    pub fn one_shot(mut self) -> Self {
        self.one_shot = true;
        self
    }
}

impl<T, E> fmt::Debug for EncodeBody<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodeBody")
            .field("value", &std::any::type_name::<T>())
            .field("one_shot", &self.one_shot)
            .finish()
    }
}

struct EncodeStage<T, E> {
    value: Arc<T>,
    encoder: Arc<E>,
    one_shot: bool,
    next: Next,
}

impl<T, E> Layer for EncodeBody<T, E>
where
    T: Serialize + Send + Sync + 'static,
    E: Encoder,
{
    fn wrap(&self, next: Next) -> Next {
        Arc::new(EncodeStage {
            value: self.value.clone(),
            encoder: self.encoder.clone(),
            one_shot: self.one_shot,
            next,
        })
    }
}

#[async_trait]
impl<T, E> Execute for EncodeStage<T, E>
where
    T: Serialize + Send + Sync + 'static,
    E: Encoder,
{
    async fn execute(
        &self,
        mut request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response, HttpError> {
        let bytes = self
            .encoder
            .encode(self.value.as_ref())
            .map_err(HttpError::Encode)?;
        *request.body_mut() = if self.one_shot {
            Body::OneShot(bytes)
        } else {
            Body::Bytes(bytes)
        };
        request.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static(self.encoder.content_type()),
        );
        self.next.execute(request, cancel).await
    }
}

/// A decoded response body, stored in the response extensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded<T>(pub T);

/// Decode the response body into `T` and store it as [`Decoded<T>`] in the
/// response extensions. The raw bytes stay in the response.
pub struct DecodeBody<T, D = Json> {
    decoder: Arc<D>,
    _target: PhantomData<fn() -> T>,
}

impl<T> DecodeBody<T, Json> {
    /// Decode JSON
    pub fn json() -> Self {
        Self::with_decoder(Json)
    }
}

impl<T, D> DecodeBody<T, D> {
    /// Decode with `decoder`
    pub fn with_decoder(decoder: D) -> Self {
        Self {
            decoder: Arc::new(decoder),
            _target: PhantomData,
        }
    }
}

impl<T, D> fmt::Debug for DecodeBody<T, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeBody")
            .field("target", &std::any::type_name::<T>())
            .finish()
    }
}

struct DecodeStage<T, D> {
    decoder: Arc<D>,
    next: Next,
    _target: PhantomData<fn() -> T>,
}

impl<T, D> Layer for DecodeBody<T, D>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
    D: Decoder,
{
    fn wrap(&self, next: Next) -> Next {
        Arc::new(DecodeStage::<T, D> {
            decoder: self.decoder.clone(),
            next,
            _target: PhantomData,
        })
    }
}

#[async_trait]
impl<T, D> Execute for DecodeStage<T, D>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
    D: Decoder,
{
    async fn execute(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response, HttpError> {
        let mut response = self.next.execute(request, cancel).await?;
        let Some(bytes) = response.body() else {
            return Err(HttpError::EmptyResponseBody);
        };
        let value: T = self.decoder.decode(bytes).map_err(HttpError::Decode)?;
        response.extensions_mut().insert(Decoded(value));
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Capture, response};
    use crate::Pipeline;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Extend {
        #[serde(rename = "extendByDays")]
        extend_by_days: i32,
    }

    #[tokio::test]
    async fn test_encode_sets_body_and_content_type() {
        let capture = Capture::ok();
        Pipeline::builder()
            .layer(EncodeBody::json(Extend { extend_by_days: 7 }))
            .service(capture.clone())
            .execute(http::Request::new(Body::Empty), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(capture.last_headers()[CONTENT_TYPE], "application/json");
        assert_eq!(
            capture.bodies(),
            vec![Some(Bytes::from_static(b"{\"extendByDays\":7}"))]
        );
    }

    #[tokio::test]
    async fn test_decode_stores_value_and_keeps_bytes() {
        let reply = response(200, Some("{\"extendByDays\":3}"));
        let response = Pipeline::builder()
            .layer(DecodeBody::<Extend>::json())
            .service(Capture::scripted(vec![Ok(reply)]))
            .execute(http::Request::new(Body::Empty), &CancellationToken::new())
            .await
            .unwrap();

        let decoded = response.extensions().get::<Decoded<Extend>>().unwrap();
        assert_eq!(decoded.0, Extend { extend_by_days: 3 });
        assert_eq!(response.body().as_deref(), Some(&b"{\"extendByDays\":3}"[..]));
    }

    #[tokio::test]
    async fn test_decode_failure() {
        let reply = response(200, Some("not json"));
        let err = Pipeline::builder()
            .layer(DecodeBody::<Extend>::json())
            .service(Capture::scripted(vec![Ok(reply)]))
            .execute(http::Request::new(Body::Empty), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Decode(_)));
    }

    struct Failing;

    impl Encoder for Failing {
        fn content_type(&self) -> &'static str {
            "application/octet-stream"
        }

        fn encode<T: Serialize + ?Sized>(&self, _: &T) -> Result<Bytes, BoxError> {
            Err("unsupported".into())
        }
    }

    #[tokio::test]
    async fn test_encode_failure_skips_transport() {
        let capture = Capture::ok();
        let err = Pipeline::builder()
            .layer(EncodeBody::with_encoder(Extend { extend_by_days: 1 }, Failing))
            .service(capture.clone())
            .execute(http::Request::new(Body::Empty), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Encode(_)));
        assert_eq!(capture.calls(), 0);
    }
}
