//! Header injection

use std::sync::Arc;

use async_trait::async_trait;
use http::{HeaderName, HeaderValue};
use tokio_util::sync::CancellationToken;

use crate::{Execute, HttpError, Layer, Next, Request, Response};

/// Replace every value of a header
#[derive(Debug, Clone)]
pub struct SetHeader {
    name: HeaderName,
    values: Vec<HeaderValue>,
}

impl SetHeader {
    /// Set `name` to a single value
    pub fn new(name: HeaderName, value: HeaderValue) -> Self {
        Self {
            name,
            values: vec![value],
        }
    }

    /// Set `name` to several values, in order
    pub fn with_values(name: HeaderName, values: Vec<HeaderValue>) -> Self {
        Self { name, values }
    }
}

/// Add values to a header, keeping those already present
#[derive(Debug, Clone)]
pub struct AppendHeader {
    name: HeaderName,
    values: Vec<HeaderValue>,
}

impl AppendHeader {
    /// Append one value
    pub fn new(name: HeaderName, value: HeaderValue) -> Self {
        Self {
            name,
            values: vec![value],
        }
    }

    /// Append several values, in order
    pub fn with_values(name: HeaderName, values: Vec<HeaderValue>) -> Self {
        Self { name, values }
    }
}

struct HeaderStage {
    name: HeaderName,
    values: Vec<HeaderValue>,
    replace: bool,
    next: Next,
}

impl Layer for SetHeader {
    fn wrap(&self, next: Next) -> Next {
        Arc::new(HeaderStage {
            name: self.name.clone(),
            values: self.values.clone(),
            replace: true,
            next,
        })
    }
}

impl Layer for AppendHeader {
    fn wrap(&self, next: Next) -> Next {
        Arc::new(HeaderStage {
            name: self.name.clone(),
            values: self.values.clone(),
            replace: false,
            next,
        })
    }
}

#[async_trait]
impl Execute for HeaderStage {
    async fn execute(
        &self,
        mut request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response, HttpError> {
        let headers = request.headers_mut();
        if self.replace {
            headers.remove(&self.name);
        }
        for value in &self.values {
            headers.append(self.name.clone(), value.clone());
        }
        self.next.execute(request, cancel).await
    }
}
