//! Backoff policies for the retry stage

use std::fmt;
use std::time::Duration;

/// Produces the pause before each retry
///
/// The retry stage clones a prototype per call, so implementations may keep
/// per-call state in `&mut self`.
pub trait Backoff: Send + Sync + fmt::Debug {
    /// Pause before the next attempt, or `None` to stop retrying
    fn next_pause(&mut self) -> Option<Duration>;
}

/// Always one second, never stops
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstantBackoff;

impl Backoff for ConstantBackoff {
    fn next_pause(&mut self) -> Option<Duration> {
        Some(Duration::from_secs(1))
    }
}

/// Exponential backoff with full jitter
///
/// Each pause is drawn uniformly from `[1ns, window]`. The window starts at
/// `initial` and is multiplied after every draw; once it grows past `max` the
/// policy stops.
#[derive(Debug, Clone)]
pub struct JitterBackoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    window: Duration,
}

impl Default for JitterBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30), 2.0)
    }
}

impl JitterBackoff {
    /// Zero durations fall back to 1s initial and 30s max; a multiplier below 1
    /// or not finite falls back to 2.
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        let initial = if initial.is_zero() {
            Duration::from_secs(1)
        } else {
            initial
        };
        let max = if max.is_zero() {
            Duration::from_secs(30)
        } else {
            max
        };
        let multiplier = if multiplier.is_finite() && multiplier >= 1.0 {
            multiplier
        } else {
            2.0
        };
        Self {
            initial,
            max,
            multiplier,
            window: initial,
        }
    }

    /// Initial window
    pub fn initial(&self) -> Duration {
        self.initial
    }

    /// Window cap
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Growth factor
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }
}

impl Backoff for JitterBackoff {
    fn next_pause(&mut self) -> Option<Duration> {
        let window_nanos = u64::try_from(self.window.as_nanos()).unwrap_or(u64::MAX).max(1);
        let pause = Duration::from_nanos(fastrand::u64(1..=window_nanos));

        // A window too large for `Duration` is past any cap.
        match Duration::try_from_secs_f64(self.window.as_secs_f64() * self.multiplier) {
            Ok(window) if window <= self.max => {
                self.window = window;
                Some(pause)
            }
            _ => {
                self.window = self.max.saturating_add(Duration::from_nanos(1));
                None
            }
        }
    }
}
