//! PostgreSQL storage backend for OctoFHIR grants
//!
//! Persisted grants live in a single `persistedgrant` table: the grant key,
//! a write timestamp, the expiration instant, and the full grant as JSONB.
//! The expiration is duplicated into its own column so the cleanup worker can
//! select and delete expired grants without touching the JSON.
//!
//! # Example
//!
//! ```ignore
//! use octofhir_grants::{GrantStoreProvider, TokenCleanupService};
//! use octofhir_grants_postgres::PostgresGrantStorage;
//!
//! let storage = PostgresGrantStorage::connect("postgres://localhost/octofhir").await?;
//! storage.ensure_table().await?;
//!
//! let service = Arc::new(TokenCleanupService::new(storage, config.cleanup));
//! service.spawn(shutdown.clone());
//! ```

pub mod grant;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use octofhir_grants::{GrantStoreProvider, GrantsError, GrantsResult};
use sqlx_core::pool::{Pool, PoolOptions};
use sqlx_core::query::query;
use sqlx_postgres::Postgres;

pub use grant::PgGrantSession;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during grant storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::Error),

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl StorageError {
    /// Create an `InvalidInput` error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Returns `true` if this is a database error.
    #[must_use]
    pub fn is_database_error(&self) -> bool {
        matches!(self, Self::Database(_))
    }

    /// Returns `true` if this is a serialization error.
    #[must_use]
    pub fn is_serialization_error(&self) -> bool {
        matches!(self, Self::Serialization(_))
    }
}

impl From<StorageError> for GrantsError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Serialization(e) => GrantsError::Serialization(e),
            StorageError::InvalidInput(message) => GrantsError::internal(message),
            other => GrantsError::storage(other.to_string()),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// PostgreSQL Grant Storage
// =============================================================================

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS persistedgrant (
    id TEXT PRIMARY KEY,
    ts TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    expiration TIMESTAMPTZ,
    resource JSONB NOT NULL
)
"#;

/// PostgreSQL storage backend for persisted grants.
///
/// Every [`session`](GrantStoreProvider::session) checks out one pooled
/// connection; the connection goes back to the pool when the session is
/// dropped.
#[derive(Debug, Clone)]
pub struct PostgresGrantStorage {
    pool: Arc<PgPool>,
}

impl PostgresGrantStorage {
    /// Create new storage with an existing connection pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Create new storage by connecting to the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        let pool = PoolOptions::<Postgres>::new().connect(database_url).await?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// Create new storage with explicit pool limits.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect_with(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> StorageResult<Self> {
        let pool = PoolOptions::<Postgres>::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `persistedgrant` table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the DDL statement fails.
    pub async fn ensure_table(&self) -> StorageResult<()> {
        query(CREATE_TABLE).execute(self.pool.as_ref()).await?;
        Ok(())
    }

    /// Check out a connection and wrap it in a grant session.
    ///
    /// # Errors
    ///
    /// Returns an error if no connection can be acquired.
    pub async fn acquire(&self) -> StorageResult<PgGrantSession> {
        let conn = self.pool.acquire().await?;
        Ok(PgGrantSession::new(conn))
    }
}

#[async_trait]
impl GrantStoreProvider for PostgresGrantStorage {
    type Session = PgGrantSession;

    async fn session(&self) -> GrantsResult<Self::Session> {
        Ok(self.acquire().await?)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_message() {
        let err = StorageError::invalid_input("PersistedGrant key cannot be empty");
        assert!(!err.is_database_error());
        assert_eq!(
            err.to_string(),
            "Invalid input: PersistedGrant key cannot be empty"
        );
    }

    #[test]
    fn test_database_error_maps_to_transient_storage_error() {
        let err = StorageError::from(sqlx_core::Error::PoolTimedOut);
        assert!(err.is_database_error());

        let grants_err = GrantsError::from(err);
        assert!(grants_err.is_transient());
        assert!(!grants_err.is_cancelled());
        assert!(grants_err.to_string().contains("Database error"));
    }

    #[test]
    fn test_serialization_error_keeps_its_kind() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err = StorageError::from(json_err);
        assert!(err.is_serialization_error());

        let grants_err = GrantsError::from(err);
        assert!(matches!(grants_err, GrantsError::Serialization(_)));
    }

    #[test]
    fn test_invalid_input_maps_to_internal() {
        let grants_err = GrantsError::from(StorageError::invalid_input("empty key"));
        assert!(matches!(grants_err, GrantsError::Internal { .. }));
    }

    #[test]
    fn test_create_table_statement() {
        assert!(CREATE_TABLE.contains("IF NOT EXISTS persistedgrant"));
        assert!(CREATE_TABLE.contains("expiration TIMESTAMPTZ"));
    }
}
