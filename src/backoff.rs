//! Backoff policies: how long to wait before a given attempt.

use std::time::Duration;

use crate::cancel::CancelToken;

/// Maps an attempt index to the delay before that attempt.
///
/// `attempt` is 0-based (0 = first attempt). Implementations must return
/// `Duration::ZERO` for attempt 0 so the first try fires immediately. The
/// token is passed so custom policies can shorten their delay once
/// cancellation fires; the built-in policies ignore it.
pub trait Backoff: Send + Sync {
    fn delay(&self, token: &CancelToken, attempt: u32) -> Duration;
}

impl<F> Backoff for F
where
    F: Fn(&CancelToken, u32) -> Duration + Send + Sync,
{
    fn delay(&self, token: &CancelToken, attempt: u32) -> Duration {
        self(token, attempt)
    }
}

/// Exponential backoff: `unit * factor^attempt`, optionally capped.
///
/// The default (1ms unit, factor 10, no cap) waits 10ms, 100ms, 1s, ... No
/// jitter is applied. Arithmetic saturates at `Duration::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exponential {
    pub unit: Duration,
    pub factor: u32,
    pub max_delay: Option<Duration>,
}

impl Default for Exponential {
    fn default() -> Self {
        Self {
            unit: Duration::from_millis(1),
            factor: 10,
            max_delay: None,
        }
    }
}

impl Exponential {
    pub fn new(unit: Duration, factor: u32) -> Self {
        Self {
            unit,
            factor,
            max_delay: None,
        }
    }

    /// Upper bound on any single delay.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    fn compute(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let raw = match self.factor.checked_pow(attempt) {
            Some(mult) => self.unit.saturating_mul(mult),
            None if self.unit.is_zero() => Duration::ZERO,
            None => Duration::MAX,
        };
        match self.max_delay {
            Some(cap) => raw.min(cap),
            None => raw,
        }
    }
}

impl Backoff for Exponential {
    fn delay(&self, _token: &CancelToken, attempt: u32) -> Duration {
        self.compute(attempt)
    }
}

/// Fixed delay between attempts (none before the first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Constant(pub Duration);

impl Constant {
    /// Never sleeps.
    pub fn none() -> Self {
        Constant(Duration::ZERO)
    }
}

impl Backoff for Constant {
    fn delay(&self, _token: &CancelToken, attempt: u32) -> Duration {
        if attempt == 0 {
            Duration::ZERO
        } else {
            self.0
        }
    }
}
