//! Retrier settings loaded from TOML.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::backoff::{Backoff, Constant, Exponential};
use crate::retrier::DEFAULT_MAX_ATTEMPTS;

/// Backoff section of the retry config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackoffConfig {
    /// `unit_ms * factor^attempt`, optionally capped at `max_delay_ms`.
    Exponential {
        #[serde(default = "default_unit_ms")]
        unit_ms: u64,
        #[serde(default = "default_factor")]
        factor: u32,
        #[serde(default)]
        max_delay_ms: Option<u64>,
    },
    /// Same delay before every retry.
    Constant { delay_ms: u64 },
    /// Retry immediately.
    None,
}

fn default_unit_ms() -> u64 {
    1
}

fn default_factor() -> u32 {
    10
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig::Exponential {
            unit_ms: default_unit_ms(),
            factor: default_factor(),
            max_delay_ms: None,
        }
    }
}

impl BackoffConfig {
    pub fn to_backoff(&self) -> Arc<dyn Backoff> {
        match *self {
            BackoffConfig::Exponential {
                unit_ms,
                factor,
                max_delay_ms,
            } => {
                let mut b = Exponential::new(Duration::from_millis(unit_ms), factor);
                if let Some(max) = max_delay_ms {
                    b = b.with_max_delay(Duration::from_millis(max));
                }
                Arc::new(b)
            }
            BackoffConfig::Constant { delay_ms } => {
                Arc::new(Constant(Duration::from_millis(delay_ms)))
            }
            BackoffConfig::None => Arc::new(Constant::none()),
        }
    }
}

/// Retrier settings as they appear in a TOML file. Missing keys take the
/// built-in defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Keep retrying when the cancellation token fires.
    pub ignore_cancellation: bool,
    /// Wake from backoff sleeps as soon as the token is cancelled.
    pub interruptible_sleep: bool,
    pub backoff: BackoffConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            ignore_cancellation: false,
            interruptible_sleep: false,
            backoff: BackoffConfig::default(),
        }
    }
}

impl RetryConfig {
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialize retry config")
    }
}

pub fn from_toml_str(data: &str) -> Result<RetryConfig> {
    toml::from_str(data).context("invalid retry config")
}

/// Load retry settings from a TOML file.
pub fn load_from_path(path: &Path) -> Result<RetryConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read retry config: {}", path.display()))?;
    let cfg = from_toml_str(&data).with_context(|| format!("in {}", path.display()))?;
    tracing::debug!(path = %path.display(), max_attempts = cfg.max_attempts, "loaded retry config");
    Ok(cfg)
}
