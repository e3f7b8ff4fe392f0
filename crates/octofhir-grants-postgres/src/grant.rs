//! Persisted grant storage.
//!
//! Grants are stored as JSONB with the key and expiration lifted into
//! columns. Deletion of expired grants re-checks the expiration in the same
//! statement, so a grant extended by a concurrent writer is left alone.

use async_trait::async_trait;
use octofhir_grants::{GrantStorage, GrantsResult, PersistedGrant};
use sqlx_core::pool::PoolConnection;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_postgres::Postgres;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::{StorageError, StorageResult};

/// Decode a grant from its stored JSONB representation.
pub(crate) fn decode_grant(resource: serde_json::Value) -> StorageResult<PersistedGrant> {
    Ok(serde_json::from_value(resource)?)
}

/// Decode an expired row selected for cleanup.
///
/// The `id` column is authoritative for the key. A resource that no longer
/// decodes still yields a grant carrying the key and expiration, so the row is
/// removed instead of failing every sweep that selects it.
pub(crate) fn decode_expired_row(
    id: String,
    expiration: OffsetDateTime,
    resource: serde_json::Value,
) -> PersistedGrant {
    match decode_grant(resource) {
        Ok(mut grant) => {
            grant.key = id;
            grant.expiration = Some(expiration);
            grant
        }
        Err(e) => {
            tracing::warn!(
                id = %id,
                error = %e,
                "Expired grant has a malformed resource; removing it by key"
            );
            PersistedGrant::new(id, "", "", "").expiring_at(expiration)
        }
    }
}

/// Encode a grant for storage.
pub(crate) fn encode_grant(grant: &PersistedGrant) -> StorageResult<serde_json::Value> {
    if grant.key.is_empty() {
        return Err(StorageError::invalid_input("PersistedGrant key cannot be empty"));
    }
    Ok(serde_json::to_value(grant)?)
}

// =============================================================================
// Grant Session
// =============================================================================

/// Grant store bound to a single pooled connection.
///
/// Created per cleanup sweep by
/// [`PostgresGrantStorage`](crate::PostgresGrantStorage); the connection is
/// returned to the pool on drop.
pub struct PgGrantSession {
    conn: Mutex<PoolConnection<Postgres>>,
}

impl PgGrantSession {
    pub(crate) fn new(conn: PoolConnection<Postgres>) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Insert or replace a grant.
    ///
    /// # Errors
    ///
    /// Returns an error if the grant cannot be encoded or the upsert fails.
    pub async fn upsert(&self, grant: &PersistedGrant) -> StorageResult<()> {
        let resource = encode_grant(grant)?;
        let mut conn = self.conn.lock().await;
        query(
            r#"
            INSERT INTO persistedgrant (id, ts, expiration, resource)
            VALUES ($1, NOW(), $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET ts = NOW(),
                expiration = EXCLUDED.expiration,
                resource = EXCLUDED.resource
            "#,
        )
        .bind(&grant.key)
        .bind(grant.expiration)
        .bind(&resource)
        .execute(&mut **conn)
        .await?;

        Ok(())
    }

    /// Find a grant by its key.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored grant is malformed.
    pub async fn find_by_key(&self, key: &str) -> StorageResult<Option<PersistedGrant>> {
        let mut conn = self.conn.lock().await;
        let row: Option<(serde_json::Value,)> = query_as(
            r#"
            SELECT resource
            FROM persistedgrant
            WHERE id = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&mut **conn)
        .await?;

        row.map(|(resource,)| decode_grant(resource)).transpose()
    }

    /// Delete a grant by its key.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete(&self, key: &str) -> StorageResult<bool> {
        let mut conn = self.conn.lock().await;
        let result = query("DELETE FROM persistedgrant WHERE id = $1")
            .bind(key)
            .execute(&mut **conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Select up to `limit` grants expired as of `now`, oldest first.
    ///
    /// Rows whose resource is malformed are returned as key-only grants
    /// (see [`decode_expired_row`]).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn select_expired(
        &self,
        now: OffsetDateTime,
        limit: usize,
    ) -> StorageResult<Vec<PersistedGrant>> {
        let limit = i64::try_from(limit)
            .map_err(|_| StorageError::invalid_input(format!("batch size {limit} is too large")))?;

        let mut conn = self.conn.lock().await;
        let rows: Vec<(String, OffsetDateTime, serde_json::Value)> = query_as(
            r#"
            SELECT id, expiration, resource
            FROM persistedgrant
            WHERE expiration IS NOT NULL
              AND expiration <= $1
            ORDER BY expiration
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&mut **conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, expiration, resource)| decode_expired_row(id, expiration, resource))
            .collect())
    }

    /// Delete the given grants if they are still expired as of `now`.
    ///
    /// Returns the keys of the deleted rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_expired(
        &self,
        keys: &[String],
        now: OffsetDateTime,
    ) -> StorageResult<Vec<String>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.lock().await;
        let rows: Vec<(String,)> = query_as(
            r#"
            DELETE FROM persistedgrant
            WHERE id = ANY($1)
              AND expiration IS NOT NULL
              AND expiration <= $2
            RETURNING id
            "#,
        )
        .bind(keys.to_vec())
        .bind(now)
        .fetch_all(&mut **conn)
        .await?;

        let removed: Vec<String> = rows.into_iter().map(|(id,)| id).collect();
        if removed.len() < keys.len() {
            tracing::debug!(
                requested = keys.len(),
                removed = removed.len(),
                "Some grants were no longer expired or already removed"
            );
        }

        Ok(removed)
    }
}

#[async_trait]
impl GrantStorage for PgGrantSession {
    async fn store(&self, grant: &PersistedGrant) -> GrantsResult<()> {
        Ok(self.upsert(grant).await?)
    }

    async fn get(&self, key: &str) -> GrantsResult<Option<PersistedGrant>> {
        Ok(self.find_by_key(key).await?)
    }

    async fn remove(&self, key: &str) -> GrantsResult<bool> {
        Ok(self.delete(key).await?)
    }

    async fn find_expired(
        &self,
        now: OffsetDateTime,
        limit: usize,
    ) -> GrantsResult<Vec<PersistedGrant>> {
        Ok(self.select_expired(now, limit).await?)
    }

    async fn remove_expired(
        &self,
        keys: &[String],
        now: OffsetDateTime,
    ) -> GrantsResult<Vec<String>> {
        Ok(self.delete_expired(keys, now).await?)
    }
}
