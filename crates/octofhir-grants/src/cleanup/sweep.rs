//! A single expired-grant sweep.

use std::collections::HashSet;
use std::sync::Arc;

use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

use super::notification::GrantRemovalNotification;
use crate::config::DEFAULT_CLEANUP_BATCH_SIZE;
use crate::storage::GrantStorage;
use crate::types::PersistedGrant;
use crate::{GrantsError, GrantsResult};

/// Removes expired grants from a store in bounded batches.
///
/// A sweep does not retry. Store failures are returned to the caller and any
/// grants left behind by a partial failure are picked up by the next sweep.
#[derive(Clone)]
pub struct TokenCleanup {
    batch_size: usize,
    notification: Option<Arc<dyn GrantRemovalNotification>>,
}

impl std::fmt::Debug for TokenCleanup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCleanup")
            .field("batch_size", &self.batch_size)
            .field("notification", &self.notification.is_some())
            .finish()
    }
}

impl Default for TokenCleanup {
    fn default() -> Self {
        Self::new(DEFAULT_CLEANUP_BATCH_SIZE)
    }
}

impl TokenCleanup {
    /// Creates a sweep that handles `batch_size` grants per round-trip.
    #[must_use]
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            notification: None,
        }
    }

    /// Registers a hook called after every removed batch.
    #[must_use]
    pub fn with_notification(mut self, notification: Arc<dyn GrantRemovalNotification>) -> Self {
        self.notification = Some(notification);
        self
    }

    /// Batch size used for each store round-trip.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Removes every grant that is expired right now.
    ///
    /// # Errors
    ///
    /// See [`remove_expired_grants_at`](Self::remove_expired_grants_at).
    pub async fn remove_expired_grants<S>(
        &self,
        store: &S,
        shutdown: &CancellationToken,
    ) -> GrantsResult<u64>
    where
        S: GrantStorage + ?Sized,
    {
        self.remove_expired_grants_at(store, OffsetDateTime::now_utc(), shutdown)
            .await
    }

    /// Removes every grant whose expiration is at or before `now`.
    ///
    /// Batches are fetched and removed until a short batch is seen. The
    /// shutdown token is checked before each batch; an in-flight store call
    /// is never interrupted.
    ///
    /// # Returns
    ///
    /// Returns the number of grants removed.
    ///
    /// # Errors
    ///
    /// Returns `GrantsError::Cancelled` if shutdown was signalled before a
    /// batch, or the store/notification error that ended the sweep.
    pub async fn remove_expired_grants_at<S>(
        &self,
        store: &S,
        now: OffsetDateTime,
        shutdown: &CancellationToken,
    ) -> GrantsResult<u64>
    where
        S: GrantStorage + ?Sized,
    {
        let mut total = 0u64;

        loop {
            if shutdown.is_cancelled() {
                return Err(GrantsError::Cancelled);
            }

            let expired = store.find_expired(now, self.batch_size).await?;
            if expired.is_empty() {
                break;
            }

            let found = expired.len();
            let keys: Vec<String> = expired.iter().map(|g| g.key.clone()).collect();
            let removed_keys = store.remove_expired(&keys, now).await?;
            let removed = removed_keys.len() as u64;
            total += removed;

            tracing::debug!(
                found = found,
                removed = removed,
                "Removed batch of expired grants"
            );

            if removed > 0
                && let Some(ref notification) = self.notification
            {
                // Grants renewed between find and remove were skipped by the store.
                let removed_keys: HashSet<&str> =
                    removed_keys.iter().map(String::as_str).collect();
                let removed_grants: Vec<PersistedGrant> = expired
                    .into_iter()
                    .filter(|g| removed_keys.contains(g.key.as_str()))
                    .collect();
                notification.grants_removed(&removed_grants).await?;
            }

            // A short batch means nothing is left; zero removals means the
            // store keeps returning grants it will not delete.
            if found < self.batch_size || removed == 0 {
                break;
            }
        }

        Ok(total)
    }
}
