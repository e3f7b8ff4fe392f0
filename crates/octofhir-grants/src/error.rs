//! Grant storage and cleanup error types.
//!
//! Failures during a cleanup sweep are contained by the worker. The only
//! variant that stops the worker is [`GrantsError::Cancelled`], which is kept
//! separate so that shutdown is never reported as a fault.

use std::fmt;

/// Errors that can occur while storing or purging persisted grants.
#[derive(Debug, thiserror::Error)]
pub enum GrantsError {
    /// The backing store failed (connection lost, query failed, ...).
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// A grant could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The grant configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// The operation observed the shutdown signal and stopped early.
    #[error("Operation cancelled")]
    Cancelled,

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl GrantsError {
    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this error carries the shutdown signal.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` if retrying on the next tick may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Storage { .. } | Self::Internal { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::Serialization(_) => ErrorCategory::Data,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Cancelled => ErrorCategory::Shutdown,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of grant errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Infrastructure/storage errors.
    Infrastructure,
    /// Malformed grant data.
    Data,
    /// Configuration errors.
    Configuration,
    /// Cooperative shutdown.
    Shutdown,
    /// Internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Data => write!(f, "data"),
            Self::Configuration => write!(f, "configuration"),
            Self::Shutdown => write!(f, "shutdown"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
