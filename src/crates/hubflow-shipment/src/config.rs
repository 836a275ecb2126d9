//! Engine configuration
//!
//! Settings are layered, later sources overriding earlier ones:
//!
//! 1. Defaults ([`EngineConfig::default`])
//! 2. A TOML file ([`EngineConfig::from_file`])
//! 3. Environment variables ([`EngineConfig::apply_env`]):
//!    `HUBFLOW_MAX_CONCURRENCY`, `HUBFLOW_MAX_REVIEW_ATTEMPTS`,
//!    `HUBFLOW_REVIEW_TIMEOUT_SECS`, `HUBFLOW_STOP_TIMEOUT_SECS`
//!
//! ```toml
//! max_concurrency = 4
//! max_review_attempts = 3
//! review_timeout_secs = 600
//! ```

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "HUBFLOW_";

fn default_max_concurrency() -> usize {
    2
}

fn default_max_review_attempts() -> u32 {
    5
}

/// Tunables for one [`ShipmentEngine`](crate::ShipmentEngine)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Maximum POs of one stop resolved at the same time
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Reviewer calls allowed per escalated PO before it is left unresolved
    #[serde(default = "default_max_review_attempts")]
    pub max_review_attempts: u32,

    /// Deadline for a single reviewer call
    #[serde(default)]
    pub review_timeout_secs: Option<u64>,

    /// Deadline for all PO work of a single stop
    #[serde(default)]
    pub stop_timeout_secs: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            max_review_attempts: default_max_review_attempts(),
            review_timeout_secs: None,
            stop_timeout_secs: None,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_max_review_attempts(mut self, attempts: u32) -> Self {
        self.max_review_attempts = attempts;
        self
    }

    /// Deadlines are stored in whole seconds; fractions round up.
    pub fn with_review_timeout(mut self, timeout: Duration) -> Self {
        self.review_timeout_secs = Some(whole_secs(timeout));
        self
    }

    /// Rounds up to whole seconds like [`with_review_timeout`](Self::with_review_timeout)
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout_secs = Some(whole_secs(timeout));
        self
    }

    pub fn review_timeout(&self) -> Option<Duration> {
        self.review_timeout_secs.map(Duration::from_secs)
    }

    pub fn stop_timeout(&self) -> Option<Duration> {
        self.stop_timeout_secs.map(Duration::from_secs)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(EngineError::Configuration(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.max_concurrency > Semaphore::MAX_PERMITS {
            return Err(EngineError::Configuration(format!(
                "max_concurrency must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if self.max_review_attempts == 0 {
            return Err(EngineError::Configuration(
                "max_review_attempts must be at least 1".to_string(),
            ));
        }
        if self.review_timeout_secs == Some(0) {
            return Err(EngineError::Configuration(
                "review_timeout_secs must be positive".to_string(),
            ));
        }
        if self.stop_timeout_secs == Some(0) {
            return Err(EngineError::Configuration(
                "stop_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| EngineError::Configuration(format!("Failed to parse config: {}", e)))
    }

    /// Load a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Configuration(format!(
                "Failed to read config {}: {}",
                path.display(),
                e
            ))
        })?;
        debug!(path = %path.display(), "Loaded engine config file");
        Self::from_toml(&content)
    }

    /// Override fields from `HUBFLOW_*` environment variables
    pub fn apply_env(self) -> Result<Self> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Override fields from any key lookup (environment, test maps, ...)
    pub fn apply_vars<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = parse_var(&lookup, "MAX_CONCURRENCY")? {
            self.max_concurrency = value;
        }
        if let Some(value) = parse_var(&lookup, "MAX_REVIEW_ATTEMPTS")? {
            self.max_review_attempts = value;
        }
        if let Some(value) = parse_var(&lookup, "REVIEW_TIMEOUT_SECS")? {
            self.review_timeout_secs = Some(value);
        }
        if let Some(value) = parse_var(&lookup, "STOP_TIMEOUT_SECS")? {
            self.stop_timeout_secs = Some(value);
        }
        Ok(self)
    }

    /// Defaults, then the optional file, then the environment; validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = config.apply_env()?;
        config.validate()?;
        Ok(config)
    }
}

fn whole_secs(timeout: Duration) -> u64 {
    let secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
    secs.max(1)
}

fn parse_var<F, T>(lookup: &F, name: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let key = format!("{}{}", ENV_PREFIX, name);
    match lookup(&key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| EngineError::Configuration(format!("Invalid value for {}: {}", key, e))),
        None => Ok(None),
    }
}
