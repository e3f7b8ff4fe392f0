//! Expired-grant cleanup configuration.
//!
//! The configuration is loaded once at startup and never changes afterwards.
//! A disabled cleanup or a non-positive interval is a valid, inert
//! configuration: the worker logs the reason and stops without sweeping.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of seconds between two sweeps.
pub const DEFAULT_CLEANUP_INTERVAL_SECS: i64 = 3600;

/// Default number of grants removed per batch.
pub const DEFAULT_CLEANUP_BATCH_SIZE: usize = 100;

/// Expired-grant cleanup configuration.
///
/// # Example (TOML)
///
/// ```toml
/// [cleanup]
/// enabled = true
/// interval_secs = 300
/// batch_size = 500
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenCleanupConfig {
    /// Run the background cleanup worker.
    pub enabled: bool,

    /// Seconds to wait between two sweeps.
    /// Values below 1 leave the worker inert.
    pub interval_secs: i64,

    /// Maximum number of grants fetched and removed per store round-trip.
    pub batch_size: usize,
}

impl Default for TokenCleanupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: DEFAULT_CLEANUP_INTERVAL_SECS,
            batch_size: DEFAULT_CLEANUP_BATCH_SIZE,
        }
    }
}

/// What the cleanup worker should do with a given configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupSchedule {
    /// Cleanup is switched off.
    Disabled,
    /// The configured interval is below one second.
    InvalidInterval(i64),
    /// Sweep every `interval`, `batch_size` grants at a time.
    Every {
        interval: Duration,
        batch_size: usize,
    },
}

impl CleanupSchedule {
    /// Returns `true` if the worker will never sweep.
    #[must_use]
    pub fn is_inert(&self) -> bool {
        !matches!(self, Self::Every { .. })
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl TokenCleanupConfig {
    /// Creates an enabled configuration with the given interval.
    #[must_use]
    pub fn every(interval_secs: i64) -> Self {
        Self {
            enabled: true,
            interval_secs,
            ..Self::default()
        }
    }

    /// Sets the batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Resolves the raw values into a schedule.
    ///
    /// Never fails: a disabled cleanup and an interval below one second are
    /// both inert schedules rather than errors.
    #[must_use]
    pub fn resolve(&self) -> CleanupSchedule {
        if !self.enabled {
            return CleanupSchedule::Disabled;
        }

        if self.interval_secs < 1 {
            return CleanupSchedule::InvalidInterval(self.interval_secs);
        }

        CleanupSchedule::Every {
            interval: Duration::from_secs(self.interval_secs as u64),
            batch_size: self.batch_size,
        }
    }

    /// Validates malformed values at load time.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if `batch_size` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue(
                "cleanup.batch_size must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}
