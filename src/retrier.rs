//! Retry loop: run an action until success, a permanent failure, cancellation,
//! or the attempt budget runs out.

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::backoff::{Backoff, Exponential};
use crate::cancel::CancelToken;
use crate::classify::is_cancellation_error;
use crate::config::RetryConfig;
use crate::error::{ActionError, RetryError};

/// Default maximum number of attempts (including the first).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Callback invoked with the error of every failed attempt.
pub type OnError = dyn Fn(&(dyn Error + 'static)) + Send + Sync;

/// Immutable retry configuration. Cheap to clone; safe to share across
/// threads and to `run` concurrently.
#[derive(Clone)]
pub struct Retrier {
    max_attempts: u32,
    backoff: Arc<dyn Backoff>,
    on_error: Arc<OnError>,
    ignore_cancellation: bool,
    interruptible_sleep: bool,
}

impl Default for Retrier {
    fn default() -> Self {
        RetrierBuilder::default().build()
    }
}

impl fmt::Debug for Retrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retrier")
            .field("max_attempts", &self.max_attempts)
            .field("ignore_cancellation", &self.ignore_cancellation)
            .field("interruptible_sleep", &self.interruptible_sleep)
            .finish_non_exhaustive()
    }
}

impl Retrier {
    pub fn builder() -> RetrierBuilder {
        RetrierBuilder::default()
    }

    /// Build a retrier from loaded configuration; the on-error callback keeps its default.
    pub fn from_config(cfg: &RetryConfig) -> Self {
        RetrierBuilder::from_config(cfg).build()
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn ignores_cancellation(&self) -> bool {
        self.ignore_cancellation
    }

    /// Runs `action` until it succeeds or the retrier gives up.
    ///
    /// Before attempt `i` (0-based) the thread sleeps for the backoff delay,
    /// then checks `token`. The on-error callback sees every failed attempt.
    /// An error that reports cancellation stops the loop unless cancellation
    /// is ignored; a non-retriable error stops it regardless.
    pub fn run<T, E, F>(&self, token: &CancelToken, mut action: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, ActionError<E>>,
        E: Error + 'static,
    {
        let mut last: Option<E> = None;
        for attempt in 0..self.max_attempts {
            let delay = self.backoff.delay(token, attempt);
            self.pause(token, delay);

            if !self.ignore_cancellation {
                if let Some(cause) = token.error() {
                    tracing::info!(attempt, %cause, "retry loop cancelled before attempt");
                    return Err(RetryError::Cancelled {
                        cause: Some(cause),
                        last,
                    });
                }
            }

            tracing::debug!(
                attempt,
                delay_ms = delay_millis(delay),
                "running attempt"
            );
            let ActionError { error, retriable } = match action() {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::debug!(attempt, "succeeded after retrying");
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            tracing::warn!(attempt, retriable, error = %error, "attempt failed");
            let dyn_error: &(dyn Error + 'static) = &error;
            (self.on_error)(dyn_error);

            if !self.ignore_cancellation && is_cancellation_error(dyn_error) {
                tracing::info!(attempt, "action reported cancellation");
                return Err(RetryError::Cancelled {
                    cause: token.error(),
                    last: Some(error),
                });
            }

            if !retriable {
                tracing::warn!(attempt, "error is not retriable, giving up");
                return Err(RetryError::NotRetriable { source: error });
            }

            last = Some(error);
        }

        tracing::warn!(attempts = self.max_attempts, "all attempts failed");
        Err(RetryError::Exhausted {
            attempts: self.max_attempts,
            last,
        })
    }

    fn pause(&self, token: &CancelToken, delay: Duration) {
        if delay.is_zero() {
            return;
        }
        // An ignored token must not shorten the backoff either.
        if self.interruptible_sleep && !self.ignore_cancellation {
            token.sleep(delay);
        } else {
            std::thread::sleep(delay);
        }
    }
}

/// Delay in whole milliseconds for log fields, clamped at `u64::MAX`.
fn delay_millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

/// Builder for a `Retrier`, starting from the defaults: 3 attempts,
/// exponential backoff (10ms, 100ms, 1s, ...), no-op error callback,
/// cancellation honoured, uninterruptible sleep.
///
/// Each setter overwrites one field; the last call wins. Values are not
/// validated: `max_attempts(0)` yields a retrier that never invokes the
/// action and reports `Exhausted` straight away.
#[derive(Clone)]
pub struct RetrierBuilder {
    max_attempts: u32,
    backoff: Arc<dyn Backoff>,
    on_error: Arc<OnError>,
    ignore_cancellation: bool,
    interruptible_sleep: bool,
}

impl Default for RetrierBuilder {
    fn default() -> Self {
        RetrierBuilder {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Arc::new(Exponential::default()),
            on_error: Arc::new(|_: &(dyn Error + 'static)| {}),
            ignore_cancellation: false,
            interruptible_sleep: false,
        }
    }
}

impl RetrierBuilder {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        RetrierBuilder {
            max_attempts: cfg.max_attempts,
            backoff: cfg.backoff.to_backoff(),
            ignore_cancellation: cfg.ignore_cancellation,
            interruptible_sleep: cfg.interruptible_sleep,
            ..Self::default()
        }
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn backoff(mut self, backoff: impl Backoff + 'static) -> Self {
        self.backoff = Arc::new(backoff);
        self
    }

    pub fn on_error<F>(mut self, on_error: F) -> Self
    where
        F: Fn(&(dyn Error + 'static)) + Send + Sync + 'static,
    {
        self.on_error = Arc::new(on_error);
        self
    }

    /// Keep retrying even when the token fires or the action reports cancellation.
    pub fn ignore_cancellation(mut self, ignore: bool) -> Self {
        self.ignore_cancellation = ignore;
        self
    }

    /// Wake from the backoff sleep as soon as the token is cancelled. Has no
    /// effect while cancellation is ignored.
    pub fn interruptible_sleep(mut self, interruptible: bool) -> Self {
        self.interruptible_sleep = interruptible;
        self
    }

    pub fn build(self) -> Retrier {
        Retrier {
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            on_error: self.on_error,
            ignore_cancellation: self.ignore_cancellation,
            interruptible_sleep: self.interruptible_sleep,
        }
    }
}
