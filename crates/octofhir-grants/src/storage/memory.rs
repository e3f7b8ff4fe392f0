//! In-memory grant store.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;

use super::{GrantStorage, GrantStoreProvider};
use crate::GrantsResult;
use crate::types::PersistedGrant;

/// Process-local grant store backed by a concurrent map.
///
/// Cloning is cheap and all clones share the same grants, so the store can
/// act as its own [`GrantStoreProvider`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryGrantStorage {
    grants: Arc<DashMap<String, PersistedGrant>>,
}

impl InMemoryGrantStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored grants, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.grants.len()
    }

    /// Returns `true` if the store holds no grants.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    /// Returns `true` if a grant with this key is stored.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.grants.contains_key(key)
    }
}

#[async_trait]
impl GrantStorage for InMemoryGrantStorage {
    async fn store(&self, grant: &PersistedGrant) -> GrantsResult<()> {
        self.grants.insert(grant.key.clone(), grant.clone());
        Ok(())
    }

    async fn get(&self, key: &str) -> GrantsResult<Option<PersistedGrant>> {
        Ok(self.grants.get(key).map(|g| g.value().clone()))
    }

    async fn remove(&self, key: &str) -> GrantsResult<bool> {
        Ok(self.grants.remove(key).is_some())
    }

    async fn find_expired(
        &self,
        now: OffsetDateTime,
        limit: usize,
    ) -> GrantsResult<Vec<PersistedGrant>> {
        Ok(self
            .grants
            .iter()
            .filter(|entry| entry.value().is_expired_at(now))
            .take(limit)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn remove_expired(
        &self,
        keys: &[String],
        now: OffsetDateTime,
    ) -> GrantsResult<Vec<String>> {
        Ok(keys
            .iter()
            .filter_map(|key| {
                self.grants
                    .remove_if(key, |_, grant| grant.is_expired_at(now))
                    .map(|(key, _)| key)
            })
            .collect())
    }
}

#[async_trait]
impl GrantStoreProvider for InMemoryGrantStorage {
    type Session = InMemoryGrantStorage;

    async fn session(&self) -> GrantsResult<Self::Session> {
        Ok(self.clone())
    }
}
