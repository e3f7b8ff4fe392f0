//! Background worker that purges expired grants on a fixed interval.
//!
//! The worker waits for the configured interval, runs one sweep, and repeats
//! until the shutdown token is cancelled. Sweep failures are logged and the
//! loop keeps going; only cancellation stops it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::notification::GrantRemovalNotification;
use super::sweep::TokenCleanup;
use crate::GrantsResult;
use crate::config::{CleanupSchedule, TokenCleanupConfig};
use crate::storage::GrantStoreProvider;

/// Lifecycle of a [`TokenCleanupService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// `run` has not been called yet.
    NotStarted = 0,
    /// The wait/sweep loop is active.
    Running = 1,
    /// Terminal; no further sweeps.
    Stopped = 2,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::NotStarted,
            1 => Self::Running,
            _ => Self::Stopped,
        }
    }
}

/// Counters describing the worker's activity so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    /// Sweeps that finished without error.
    pub sweeps_completed: u64,
    /// Sweeps that failed and were skipped until the next tick.
    pub sweeps_failed: u64,
    /// Grants removed across all sweeps.
    pub grants_removed: u64,
}

/// Periodic expired-grant cleanup worker.
///
/// # Example
///
/// ```ignore
/// let service = Arc::new(TokenCleanupService::new(provider, config.cleanup));
/// let shutdown = CancellationToken::new();
/// let handle = service.clone().spawn(shutdown.clone());
///
/// // on process shutdown
/// shutdown.cancel();
/// handle.await?;
/// ```
pub struct TokenCleanupService<P> {
    provider: P,
    config: TokenCleanupConfig,
    cleanup: TokenCleanup,
    state: AtomicU8,
    sweeps_completed: AtomicU64,
    sweeps_failed: AtomicU64,
    grants_removed: AtomicU64,
}

impl<P> TokenCleanupService<P>
where
    P: GrantStoreProvider + 'static,
{
    /// Creates a worker that sweeps stores opened from `provider`.
    pub fn new(provider: P, config: TokenCleanupConfig) -> Self {
        let cleanup = TokenCleanup::new(config.batch_size);
        Self {
            provider,
            config,
            cleanup,
            state: AtomicU8::new(WorkerState::NotStarted as u8),
            sweeps_completed: AtomicU64::new(0),
            sweeps_failed: AtomicU64::new(0),
            grants_removed: AtomicU64::new(0),
        }
    }

    /// Registers a hook called after every removed batch.
    #[must_use]
    pub fn with_notification(mut self, notification: Arc<dyn GrantRemovalNotification>) -> Self {
        self.cleanup = self.cleanup.with_notification(notification);
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Activity counters.
    pub fn stats(&self) -> CleanupStats {
        CleanupStats {
            sweeps_completed: self.sweeps_completed.load(Ordering::Relaxed),
            sweeps_failed: self.sweeps_failed.load(Ordering::Relaxed),
            grants_removed: self.grants_removed.load(Ordering::Relaxed),
        }
    }

    /// Runs the worker on its own tokio task.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    /// Runs the wait/sweep loop until `shutdown` is cancelled.
    ///
    /// Returns immediately when the configuration is inert. Only the first
    /// call does anything; later calls return at once.
    pub async fn run(&self, shutdown: CancellationToken) {
        if self
            .state
            .compare_exchange(
                WorkerState::NotStarted as u8,
                WorkerState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            tracing::debug!(state = ?self.state(), "Grant removal already started");
            return;
        }

        let interval = match self.config.resolve() {
            CleanupSchedule::Disabled => {
                tracing::debug!(event = "cleanup_disabled", "Grant removal is not enabled");
                self.stop();
                return;
            }
            CleanupSchedule::InvalidInterval(secs) => {
                tracing::debug!(
                    event = "cleanup_invalid_interval",
                    interval_secs = secs,
                    "Grant removal interval must be at least 1 second"
                );
                self.stop();
                return;
            }
            CleanupSchedule::Every { interval, .. } => interval,
        };

        tracing::info!(
            event = "cleanup_started",
            interval_secs = interval.as_secs(),
            batch_size = self.cleanup.batch_size(),
            "Grant removal started"
        );

        while self.wait(interval, &shutdown).await {
            match self.sweep(&shutdown).await {
                Ok(removed) => {
                    self.sweeps_completed.fetch_add(1, Ordering::Relaxed);
                    self.grants_removed.fetch_add(removed, Ordering::Relaxed);
                    tracing::debug!(removed = removed, "Grant removal sweep completed");
                }
                // Only our own shutdown ends the loop; a store or hook that
                // reports cancellation on its own is an ordinary failure.
                Err(e) if e.is_cancelled() && shutdown.is_cancelled() => break,
                Err(e) => {
                    self.sweeps_failed.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(
                        event = "cleanup_sweep_failed",
                        error = %e,
                        category = %e.category(),
                        "Error running grant removal"
                    );
                }
            }
        }

        self.stop();
        tracing::info!(event = "cleanup_stopped", "Grant removal ended");
    }

    /// Sleeps for `interval`. Returns `false` if shutdown was signalled first.
    async fn wait(&self, interval: Duration, shutdown: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => false,
            _ = tokio::time::sleep(interval) => true,
        }
    }

    /// Runs one sweep against a freshly opened session.
    async fn sweep(&self, shutdown: &CancellationToken) -> GrantsResult<u64> {
        let session = self.provider.session().await?;
        self.cleanup.remove_expired_grants(&session, shutdown).await
    }

    fn stop(&self) {
        self.state.store(WorkerState::Stopped as u8, Ordering::Release);
    }
}
