//! Errors surfaced by the retry loop.

use std::error::Error;
use std::fmt;

use crate::cancel::CancelError;

/// A single failed attempt: the underlying error plus whether trying again
/// could help.
///
/// Callers decide retriability per error, e.g. HTTP 5xx and connection
/// failures are retriable while 4xx are not.
///
/// As an `Error` it is transparent: `Display` and `source()` both forward to
/// the wrapped error, so the flag never shows up as an extra link in a chain.
#[derive(Debug)]
pub struct ActionError<E> {
    pub error: E,
    pub retriable: bool,
}

impl<E> ActionError<E> {
    pub fn new(error: E, retriable: bool) -> Self {
        ActionError { error, retriable }
    }

    /// Failure worth another attempt.
    pub fn retriable(error: E) -> Self {
        Self::new(error, true)
    }

    /// Failure that will not go away by trying again.
    pub fn permanent(error: E) -> Self {
        Self::new(error, false)
    }

    pub fn into_inner(self) -> E {
        self.error
    }
}

impl<E: fmt::Display> fmt::Display for ActionError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl<E: Error + 'static> Error for ActionError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.error.source()
    }
}

/// Terminal kind of a failed run, for sentinel-style comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryErrorKind {
    Cancelled,
    NotRetriable,
    Exhausted,
}

/// Why `Retrier::run` gave up. The last action error is kept whenever one exists.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E>
where
    E: Error + 'static,
{
    /// The token fired before an attempt (`cause` is set), or the action
    /// failed with an error that itself reports cancellation (`last` is set).
    #[error("operation cancelled")]
    Cancelled {
        cause: Option<CancelError>,
        #[source]
        last: Option<E>,
    },
    /// The action reported a failure that should not be retried.
    #[error("request is not retriable: {source}")]
    NotRetriable {
        #[source]
        source: E,
    },
    /// Every attempt failed with a retriable error. `last` is `None` only
    /// when the retrier was configured with zero attempts.
    #[error("request not successful after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Option<E>,
    },
}

impl<E> RetryError<E>
where
    E: Error + 'static,
{
    pub fn kind(&self) -> RetryErrorKind {
        match self {
            RetryError::Cancelled { .. } => RetryErrorKind::Cancelled,
            RetryError::NotRetriable { .. } => RetryErrorKind::NotRetriable,
            RetryError::Exhausted { .. } => RetryErrorKind::Exhausted,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == RetryErrorKind::Cancelled
    }

    pub fn is_not_retriable(&self) -> bool {
        self.kind() == RetryErrorKind::NotRetriable
    }

    pub fn is_exhausted(&self) -> bool {
        self.kind() == RetryErrorKind::Exhausted
    }

    /// The error returned by the most recent failed attempt, if any.
    pub fn last_error(&self) -> Option<&E> {
        match self {
            RetryError::Cancelled { last, .. } | RetryError::Exhausted { last, .. } => {
                last.as_ref()
            }
            RetryError::NotRetriable { source } => Some(source),
        }
    }

    pub fn into_last_error(self) -> Option<E> {
        match self {
            RetryError::Cancelled { last, .. } | RetryError::Exhausted { last, .. } => last,
            RetryError::NotRetriable { source } => Some(source),
        }
    }
}
