//! # octofhir-grants
//!
//! Persisted grant storage and expired-grant cleanup for the OctoFHIR
//! identity provider.
//!
//! This crate provides:
//! - The [`PersistedGrant`] domain type
//! - The [`GrantStorage`] contract implemented by storage backends
//! - A process-local [`InMemoryGrantStorage`]
//! - The [`TokenCleanupService`] background worker that purges expired grants
//!
//! ## Overview
//!
//! Grants (authorization codes, refresh tokens, consents, device codes) are
//! written by the token endpoints and expire on their own schedule. The
//! cleanup worker wakes up every configured interval, opens a store session
//! through a [`GrantStoreProvider`], removes expired grants in bounded
//! batches and releases the session. A failed sweep is logged and retried on
//! the next tick; only the shutdown token stops the worker.
//!
//! ## Modules
//!
//! - [`config`] - Cleanup configuration
//! - [`cleanup`] - Sweep and background worker
//! - [`storage`] - Storage traits and the in-memory backend
//! - [`types`] - Grant domain types
//! - [`error`] - Error types

pub mod cleanup;
pub mod config;
pub mod error;
pub mod storage;
pub mod types;

pub use cleanup::{
    CleanupStats, GrantRemovalNotification, TokenCleanup, TokenCleanupService, WorkerState,
};
pub use config::{CleanupSchedule, ConfigError, TokenCleanupConfig};
pub use error::{ErrorCategory, GrantsError};
pub use storage::{GrantStorage, GrantStoreProvider, InMemoryGrantStorage};
pub use types::{PersistedGrant, grant_types};

/// Type alias for grant storage and cleanup results.
pub type GrantsResult<T> = Result<T, GrantsError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use octofhir_grants::prelude::*;
/// ```
pub mod prelude {
    pub use crate::GrantsResult;
    pub use crate::cleanup::{
        CleanupStats, GrantRemovalNotification, TokenCleanup, TokenCleanupService, WorkerState,
    };
    pub use crate::config::{CleanupSchedule, ConfigError, TokenCleanupConfig};
    pub use crate::error::{ErrorCategory, GrantsError};
    pub use crate::storage::{GrantStorage, GrantStoreProvider, InMemoryGrantStorage};
    pub use crate::types::{PersistedGrant, grant_types};
}
