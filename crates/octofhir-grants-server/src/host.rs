use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use octofhir_grants::{CleanupStats, GrantStoreProvider, TokenCleanupConfig, TokenCleanupService};
use octofhir_grants_postgres::PostgresGrantStorage;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;

pub struct GrantsHost {
    config: AppConfig,
}

impl GrantsHost {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Connects to PostgreSQL and runs the cleanup worker until a shutdown signal.
    ///
    /// With cleanup disabled, or a non-positive interval, returns without
    /// touching the database.
    pub async fn run(self) -> anyhow::Result<()> {
        if self.config.cleanup.resolve().is_inert() {
            tracing::info!(
                enabled = self.config.cleanup.enabled,
                interval_secs = self.config.cleanup.interval_secs,
                "Grant cleanup is inert, not connecting to storage"
            );
            return Ok(());
        }

        let pg = self
            .config
            .storage
            .postgres
            .as_ref()
            .context("storage.postgres config is required")?;

        let storage = PostgresGrantStorage::connect_with(
            &pg.connection_url(),
            pg.pool_size,
            pg.connect_timeout(),
        )
        .await
        .context("failed to connect to PostgreSQL")?;
        storage
            .ensure_table()
            .await
            .context("failed to prepare persistedgrant table")?;

        tracing::info!(
            host = %pg.host,
            database = %pg.database,
            pool_size = pg.pool_size,
            "Grant store connected"
        );

        let stats = run_until(storage, self.config.cleanup, shutdown_signal()).await?;
        tracing::info!(
            sweeps_completed = stats.sweeps_completed,
            sweeps_failed = stats.sweeps_failed,
            grants_removed = stats.grants_removed,
            "Grant cleanup host stopped"
        );
        Ok(())
    }
}

/// Runs the cleanup worker until `signal` resolves or the worker stops on its own.
///
/// The worker stops on its own only when the configuration is inert.
pub async fn run_until<P, F>(
    provider: P,
    cleanup: TokenCleanupConfig,
    signal: F,
) -> anyhow::Result<CleanupStats>
where
    P: GrantStoreProvider + 'static,
    F: Future<Output = ()>,
{
    let shutdown = CancellationToken::new();
    let service = Arc::new(TokenCleanupService::new(provider, cleanup));
    let mut handle = service.clone().spawn(shutdown.child_token());

    tokio::select! {
        res = &mut handle => {
            res.context("cleanup worker panicked")?;
            tracing::info!("Cleanup worker has nothing to do");
        }
        _ = signal => {
            shutdown.cancel();
            handle.await.context("cleanup worker panicked")?;
        }
    }

    Ok(service.stats())
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PostgresStorageConfig;
    use octofhir_grants::{GrantStorage, InMemoryGrantStorage, PersistedGrant, grant_types};
    use std::time::Duration;
    use time::OffsetDateTime;

    #[tokio::test(start_paused = true)]
    async fn test_inert_worker_returns_without_signal() {
        let stats = run_until(
            InMemoryGrantStorage::new(),
            TokenCleanupConfig::default(),
            std::future::pending(),
        )
        .await
        .unwrap();

        assert_eq!(stats, CleanupStats::default());
    }

    #[tokio::test]
    async fn test_inert_host_does_not_need_a_database() {
        let mut config = AppConfig::default();
        config.storage.postgres = Some(PostgresStorageConfig {
            url: Some("postgres://grants@unreachable.invalid:1/grants".into()),
            connect_timeout_ms: 10,
            ..PostgresStorageConfig::default()
        });

        assert!(!config.cleanup.enabled);
        GrantsHost::new(config.clone()).run().await.unwrap();

        config.cleanup = TokenCleanupConfig::every(0);
        GrantsHost::new(config).run().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_stops_running_worker() {
        let store = InMemoryGrantStorage::new();
        let grant = PersistedGrant::new("old", grant_types::REFRESH_TOKEN, "app", "{}")
            .expiring_at(OffsetDateTime::now_utc() - time::Duration::minutes(1));
        store.store(&grant).await.unwrap();

        let stats = run_until(
            store.clone(),
            TokenCleanupConfig::every(10),
            tokio::time::sleep(Duration::from_secs(25)),
        )
        .await
        .unwrap();

        assert_eq!(stats.sweeps_completed, 2);
        assert_eq!(stats.grants_removed, 1);
        assert!(store.is_empty());
    }
}
