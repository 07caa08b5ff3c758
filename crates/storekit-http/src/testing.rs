//! Scripted transport double for stage tests

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{Execute, HttpError, Request, Response};

pub(crate) fn response(status: u16, body: Option<&'static str>) -> Response {
    let mut response = http::Response::new(body.map(|body| Bytes::from_static(body.as_bytes())));
    *response.status_mut() = StatusCode::from_u16(status).unwrap();
    response
}

pub(crate) struct Capture {
    script: Mutex<VecDeque<Result<Response, HttpError>>>,
    calls: AtomicUsize,
    headers: Mutex<Vec<HeaderMap>>,
    bodies: Mutex<Vec<Option<Bytes>>>,
}

impl Capture {
    /// Answers 200 `{}` to everything
    pub(crate) fn ok() -> Arc<Self> {
        Self::scripted(Vec::new())
    }

    /// Plays `script` in order, then answers 200 `{}`
    pub(crate) fn scripted(script: Vec<Result<Response, HttpError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            headers: Mutex::new(Vec::new()),
            bodies: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_headers(&self) -> HeaderMap {
        self.headers.lock().last().cloned().unwrap_or_default()
    }

    pub(crate) fn bodies(&self) -> Vec<Option<Bytes>> {
        self.bodies.lock().clone()
    }
}

#[async_trait]
impl Execute for Capture {
    async fn execute(
        &self,
        request: Request,
        _cancel: &CancellationToken,
    ) -> Result<Response, HttpError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.headers.lock().push(request.headers().clone());
        self.bodies.lock().push(request.into_body().into_bytes());
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(response(200, Some("{}"))))
    }
}
