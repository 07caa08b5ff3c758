//! The execution capability and the stage chain built from it
//!
//! Every stage and every transport implements [`Execute`]. A [`Layer`] turns the
//! next executor into a stage wrapping it. [`PipelineBuilder`] takes layers
//! outermost-first and a transport, and wraps them innermost-first so the first
//! layer listed is the first to see the request and the last to see the response.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{HttpError, Request, Response};

/// Shared handle to the next executor in a chain
pub type Next = Arc<dyn Execute>;

/// Send a request and produce a response
#[async_trait]
pub trait Execute: Send + Sync {
    /// Execute one request
    ///
    /// Implementations that wait (transport I/O, retry pauses, rate limit waits)
    /// must return [`HttpError::Cancelled`] promptly once `cancel` fires.
    async fn execute(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response, HttpError>;
}

/// Builds a stage around the next executor
pub trait Layer: Send + Sync {
    /// Wrap `next`
    fn wrap(&self, next: Next) -> Next;
}

/// An assembled chain of stages ending in a transport
#[derive(Clone)]
pub struct Pipeline {
    head: Next,
    stages: usize,
}

impl Pipeline {
    /// Start a pipeline
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Number of stages in front of the transport
    pub fn stages(&self) -> usize {
        self.stages
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stages)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Execute for Pipeline {
    async fn execute(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response, HttpError> {
        self.head.execute(request, cancel).await
    }
}

/// Collects layers, outermost first
#[derive(Default)]
pub struct PipelineBuilder {
    layers: Vec<Box<dyn Layer>>,
}

impl PipelineBuilder {
    /// Append a layer inside the ones already added
    pub fn layer(mut self, layer: impl Layer + 'static) -> Self {
        self.layers.push(Box::new(layer));
        self
    }

    /// Append a layer only when present
    pub fn optional_layer(self, layer: Option<impl Layer + 'static>) -> Self {
        match layer {
            Some(layer) => self.layer(layer),
            None => self,
        }
    }

    /// Terminate the chain with `transport`
    pub fn service(self, transport: Next) -> Pipeline {
        let stages = self.layers.len();
        let head = self
            .layers
            .iter()
            .rev()
            .fold(transport, |next, layer| layer.wrap(next));
        Pipeline { head, stages }
    }
}

impl fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("layers", &self.layers.len())
            .finish()
    }
}
