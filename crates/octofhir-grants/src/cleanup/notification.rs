use async_trait::async_trait;

use crate::GrantsResult;
use crate::types::PersistedGrant;

/// Hook invoked after each batch of expired grants has been removed.
///
/// Useful for cascading the removal to caches or audit trails. An error
/// fails the current sweep; the next tick picks up whatever is left.
#[async_trait]
pub trait GrantRemovalNotification: Send + Sync {
    /// Called with the grants the store actually removed in the last batch.
    ///
    /// Grants renewed between lookup and removal are not included.
    async fn grants_removed(&self, grants: &[PersistedGrant]) -> GrantsResult<()>;
}
