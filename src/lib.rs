//! Retry fallible actions with backoff and cooperative cancellation.
//!
//! A [`Retrier`] holds immutable settings (attempt budget, backoff policy,
//! error callback, cancellation handling) and runs any number of actions.
//! Each [`Retrier::run`] call sleeps per the backoff policy, checks the
//! [`CancelToken`], invokes the action, and stops on success, on a
//! non-retriable error, on cancellation, or once attempts run out.
//!
//! ```no_run
//! use std::io;
//! use tryagain::{ActionError, CancelToken, Retrier};
//!
//! let retrier = Retrier::builder()
//!     .max_attempts(5)
//!     .on_error(|e| eprintln!("attempt failed: {e}"))
//!     .build();
//! let token = CancelToken::with_timeout(std::time::Duration::from_secs(10));
//! let body = retrier.run(&token, || {
//!     std::fs::read_to_string("/etc/hostname").map_err(|e| {
//!         let retriable = e.kind() == io::ErrorKind::Interrupted;
//!         ActionError::new(e, retriable)
//!     })
//! });
//! ```

pub mod backoff;
pub mod cancel;
pub mod classify;
pub mod config;
pub mod error;
pub mod logging;
pub mod retrier;

pub use backoff::{Backoff, Constant, Exponential};
pub use cancel::{CancelError, CancelToken};
pub use classify::{is_cancellation_error, is_cancellation_text, is_retriable_http_status};
pub use config::{BackoffConfig, RetryConfig};
pub use error::{ActionError, RetryError, RetryErrorKind};
pub use retrier::{Retrier, RetrierBuilder};
