//! Classify action errors: does an error report cancellation, is a status worth retrying.

use std::error::Error;
use std::fmt::Display;

use crate::cancel::CancelError;

const CANCELED_PHRASE: &str = "context canceled";
const DEADLINE_PHRASE: &str = "deadline exceeded";

/// True if the error's text contains "context canceled" or "deadline exceeded",
/// ignoring case.
///
/// This is a string heuristic: it only fires when the error message carries
/// the canonical phrasing. Prefer `is_cancellation_error` where the error
/// value is available.
pub fn is_cancellation_text(err: &dyn Display) -> bool {
    let lower = err.to_string().to_lowercase();
    lower.contains(CANCELED_PHRASE) || lower.contains(DEADLINE_PHRASE)
}

/// True if the error, or anything in its `source()` chain, is a `CancelError`
/// or has cancellation text.
pub fn is_cancellation_error(err: &(dyn Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.downcast_ref::<CancelError>().is_some() || is_cancellation_text(&e) {
            return true;
        }
        current = e.source();
    }
    false
}

/// Whether an HTTP status code is worth retrying: throttling (408, 429) and
/// server errors (5xx). Everything else, including other 4xx, is permanent.
pub fn is_retriable_http_status(code: u16) -> bool {
    matches!(code, 408 | 429 | 500..=599)
}
