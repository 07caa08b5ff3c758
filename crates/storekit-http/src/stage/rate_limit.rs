//! Shared rate limiter and the stage that waits on it

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{Execute, HttpError, Layer, Next, Request, Response};

/// Sliding-window limiter: at most `limit` grants in any rolling `window`
///
/// Every grant is logged; a slot frees up exactly one window after the grant that
/// used it. Unlike a token bucket refilled on a fixed schedule, there is no refill
/// timer and no burst at a refill boundary: the rolling bound holds at every
/// instant. Share one limiter (behind an `Arc`) across all pipelines of a client.
#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    grants: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// `limit` requests per `window`. A zero limit is raised to one.
    pub fn new(limit: usize, window: Duration) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            window,
            grants: Mutex::new(VecDeque::with_capacity(limit)),
        }
    }

    /// `limit` requests per rolling minute
    pub fn per_minute(limit: usize) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    /// Requests allowed per window
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Wait for a slot
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Cancelled`] if `cancel` fires first.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), HttpError> {
        loop {
            let wait_until = {
                let now = Instant::now();
                let mut grants = self.grants.lock();
                while grants
                    .front()
                    .is_some_and(|granted| now.duration_since(*granted) >= self.window)
                {
                    grants.pop_front();
                }
                if grants.len() < self.limit {
                    grants.push_back(now);
                    return Ok(());
                }
                match grants.front() {
                    Some(oldest) => *oldest + self.window,
                    None => now,
                }
            };

            debug!(
                wait_ms = wait_until
                    .saturating_duration_since(Instant::now())
                    .as_millis(),
                "Rate limit reached, waiting"
            );
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(HttpError::Cancelled),
                () = sleep_until(wait_until) => {}
            }
        }
    }
}

/// Block each request until the shared limiter admits it
#[derive(Debug, Clone)]
pub struct RateLimit {
    limiter: Arc<RateLimiter>,
}

impl RateLimit {
    /// Use `limiter` for admission
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

struct RateLimitStage {
    limiter: Arc<RateLimiter>,
    next: Next,
}

impl Layer for RateLimit {
    fn wrap(&self, next: Next) -> Next {
        Arc::new(RateLimitStage {
            limiter: self.limiter.clone(),
            next,
        })
    }
}

#[async_trait]
impl Execute for RateLimitStage {
    async fn execute(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response, HttpError> {
        self.limiter.acquire(cancel).await?;
        self.next.execute(request, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Capture;
    use crate::{Body, Pipeline};

    #[tokio::test(start_paused = true)]
    async fn test_never_more_than_limit_in_any_window() {
        let limiter = Arc::new(RateLimiter::per_minute(5));
        let cancel = CancellationToken::new();

        let tasks: Vec<_> = (0..17)
            .map(|_| {
                let limiter = limiter.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    limiter.acquire(&cancel).await.unwrap();
                    Instant::now()
                })
            })
            .collect();

        let mut granted = Vec::new();
        for task in tasks {
            granted.push(task.await.unwrap());
        }
        granted.sort();

        for pair in granted.windows(6) {
            assert!(pair[5] - pair[0] >= Duration::from_secs(60));
        }
        // 17 grants at 5 per minute need three full windows.
        assert!(granted[16] - granted[0] >= Duration::from_secs(180));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_waiting() {
        let limiter = RateLimiter::per_minute(1);
        let cancel = CancellationToken::new();
        limiter.acquire(&cancel).await.unwrap();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = limiter.acquire(&cancel).await.unwrap_err();
        assert!(matches!(err, HttpError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stage_gates_transport() {
        let limiter = Arc::new(RateLimiter::per_minute(2));
        let capture = Capture::ok();
        let pipeline = Pipeline::builder()
            .layer(RateLimit::new(limiter))
            .service(capture.clone());

        let started = Instant::now();
        for _ in 0..3 {
            pipeline
                .execute(http::Request::new(Body::Empty), &CancellationToken::new())
                .await
                .unwrap();
        }
        assert_eq!(capture.calls(), 3);
        assert!(started.elapsed() >= Duration::from_secs(60));
    }
}
