//! Storage traits for persisted grants.
//!
//! The cleanup worker only needs two store operations: finding expired
//! grants and removing them by key. The remaining operations are what the
//! identity provider itself uses when issuing and redeeming grants.
//!
//! # Implementations
//!
//! - [`memory::InMemoryGrantStorage`] - process-local store, used in tests
//! - `octofhir-grants-postgres` - PostgreSQL storage backend

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::GrantsResult;
use crate::types::PersistedGrant;

pub mod memory;

pub use memory::InMemoryGrantStorage;

/// Storage trait for persisted grants.
///
/// Stores are shared with the rest of the identity provider, so
/// implementations must tolerate concurrent writers. Removal of expired
/// grants is keyed and re-checks the expiry predicate, so a grant that was
/// refreshed between [`find_expired`](Self::find_expired) and
/// [`remove_expired`](Self::remove_expired) survives.
#[async_trait]
pub trait GrantStorage: Send + Sync {
    /// Stores a grant, replacing any grant with the same key.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn store(&self, grant: &PersistedGrant) -> GrantsResult<()>;

    /// Finds a grant by its key.
    ///
    /// Returns grants regardless of expiration; callers check
    /// [`PersistedGrant::is_expired`] before using them.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get(&self, key: &str) -> GrantsResult<Option<PersistedGrant>>;

    /// Removes a grant by its key.
    ///
    /// Returns `true` if a grant was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn remove(&self, key: &str) -> GrantsResult<bool>;

    /// Finds up to `limit` grants whose expiration is at or before `now`.
    ///
    /// Grants without an expiration are never returned. No ordering is
    /// guaranteed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_expired(
        &self,
        now: OffsetDateTime,
        limit: usize,
    ) -> GrantsResult<Vec<PersistedGrant>>;

    /// Removes the grants with the given keys that are still expired as of `now`.
    ///
    /// Keys that no longer exist or no longer match are skipped silently.
    ///
    /// # Returns
    ///
    /// Returns the keys that were actually removed, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails. Some grants may have
    /// been removed before the failure.
    async fn remove_expired(
        &self,
        keys: &[String],
        now: OffsetDateTime,
    ) -> GrantsResult<Vec<String>>;
}

/// Source of grant store sessions.
///
/// The cleanup worker opens one session per sweep and drops it when the sweep
/// ends, on success and failure alike. Backends with pooled connections hand
/// out a pooled connection here.
#[async_trait]
pub trait GrantStoreProvider: Send + Sync {
    /// Session type returned by [`session`](Self::session).
    type Session: GrantStorage;

    /// Opens a store session for a single sweep.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    async fn session(&self) -> GrantsResult<Self::Session>;
}
