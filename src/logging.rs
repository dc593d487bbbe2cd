//! Logging init for applications embedding the retrier.
//!
//! The library only emits `tracing` events; nothing is printed unless the
//! host installs a subscriber, either its own or one of these.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,tryagain=debug";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a stderr subscriber filtered by `RUST_LOG` (default `info,tryagain=debug`).
/// Returns Err if a global subscriber is already set.
pub fn try_init_logging_stderr() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;
    tracing::debug!("tryagain logging initialized on stderr");
    Ok(())
}

/// Like `try_init_logging_stderr` but panics if a subscriber is already installed.
pub fn init_logging_stderr() {
    if let Err(e) = try_init_logging_stderr() {
        panic!("{e:#}");
    }
}
