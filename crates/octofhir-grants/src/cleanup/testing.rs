//! Test doubles shared by the sweep and worker tests.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

use super::notification::GrantRemovalNotification;
use crate::storage::{GrantStorage, GrantStoreProvider, InMemoryGrantStorage};
use crate::types::{PersistedGrant, grant_types};
use crate::{GrantsError, GrantsResult};

pub fn expired(key: &str, at: OffsetDateTime) -> PersistedGrant {
    PersistedGrant::new(key, grant_types::REFRESH_TOKEN, "test-client", "{}").expiring_at(at)
}

pub fn live(key: &str, until: OffsetDateTime) -> PersistedGrant {
    PersistedGrant::new(key, grant_types::AUTHORIZATION_CODE, "test-client", "{}")
        .expiring_at(until)
}

/// In-memory store that counts calls and can fail a given `remove_expired` call.
#[derive(Default)]
pub struct ScriptedStorage {
    pub inner: InMemoryGrantStorage,
    find_calls: AtomicUsize,
    remove_calls: AtomicUsize,
    fail_remove_on: Option<usize>,
    renew_on_remove: Option<String>,
}

impl ScriptedStorage {
    /// Fails the `n`-th (1-based) call to `remove_expired`.
    pub fn fail_remove_call(mut self, n: usize) -> Self {
        self.fail_remove_on = Some(n);
        self
    }

    /// Extends `key` by an hour right before every `remove_expired`, as a
    /// concurrent writer refreshing the grant would.
    pub fn renew_on_remove(mut self, key: &str) -> Self {
        self.renew_on_remove = Some(key.to_string());
        self
    }

    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GrantStorage for ScriptedStorage {
    async fn store(&self, grant: &PersistedGrant) -> GrantsResult<()> {
        self.inner.store(grant).await
    }

    async fn get(&self, key: &str) -> GrantsResult<Option<PersistedGrant>> {
        self.inner.get(key).await
    }

    async fn remove(&self, key: &str) -> GrantsResult<bool> {
        self.inner.remove(key).await
    }

    async fn find_expired(
        &self,
        now: OffsetDateTime,
        limit: usize,
    ) -> GrantsResult<Vec<PersistedGrant>> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.find_expired(now, limit).await
    }

    async fn remove_expired(
        &self,
        keys: &[String],
        now: OffsetDateTime,
    ) -> GrantsResult<Vec<String>> {
        let call = self.remove_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_remove_on == Some(call) {
            return Err(GrantsError::storage("connection reset by peer"));
        }
        if let Some(key) = &self.renew_on_remove
            && let Some(grant) = self.inner.get(key).await?
        {
            let renewed = grant.expiring_at(now + time::Duration::hours(1));
            self.inner.store(&renewed).await?;
        }
        self.inner.remove_expired(keys, now).await
    }
}

/// Records the keys of every notified batch.
#[derive(Default)]
pub struct RecordingNotification {
    batches: Mutex<Vec<Vec<String>>>,
}

impl RecordingNotification {
    /// Size of each notified batch, in order.
    pub fn batches(&self) -> Vec<usize> {
        self.batches.lock().unwrap().iter().map(Vec::len).collect()
    }

    /// Keys of each notified batch, sorted within the batch.
    pub fn notified_keys(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl GrantRemovalNotification for RecordingNotification {
    async fn grants_removed(&self, grants: &[PersistedGrant]) -> GrantsResult<()> {
        let mut keys: Vec<String> = grants.iter().map(|g| g.key.clone()).collect();
        keys.sort();
        self.batches.lock().unwrap().push(keys);
        Ok(())
    }
}

/// How a scripted session behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionScript {
    /// Delegate to the in-memory store.
    Healthy,
    /// Opening the session fails.
    Unavailable,
    /// Queries fail with a storage error.
    Broken,
    /// Queries report cancellation.
    Cancelled,
}

/// Provider whose sessions follow a script, one entry per opened session.
/// Sessions beyond the script are healthy.
#[derive(Default)]
pub struct ScriptedProvider {
    pub store: InMemoryGrantStorage,
    script: Mutex<VecDeque<SessionScript>>,
    on_session: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
    opened: AtomicUsize,
    open_sessions: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    pub fn with_script(store: InMemoryGrantStorage, script: &[SessionScript]) -> Self {
        Self {
            store,
            script: Mutex::new(script.iter().copied().collect()),
            ..Self::default()
        }
    }

    /// Runs `hook` every time a session is requested.
    pub fn on_session(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_session.lock().unwrap() = Some(Box::new(hook));
    }

    /// Number of `session()` calls so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of sessions not yet dropped.
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }
}

pub struct ScriptedSession {
    inner: InMemoryGrantStorage,
    script: SessionScript,
    open_sessions: Arc<AtomicUsize>,
}

impl ScriptedSession {
    fn check(&self) -> GrantsResult<()> {
        match self.script {
            SessionScript::Broken => Err(GrantsError::storage("connection reset by peer")),
            SessionScript::Cancelled => Err(GrantsError::Cancelled),
            _ => Ok(()),
        }
    }
}

impl Drop for ScriptedSession {
    fn drop(&mut self) {
        self.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl GrantStorage for ScriptedSession {
    async fn store(&self, grant: &PersistedGrant) -> GrantsResult<()> {
        self.check()?;
        self.inner.store(grant).await
    }

    async fn get(&self, key: &str) -> GrantsResult<Option<PersistedGrant>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn remove(&self, key: &str) -> GrantsResult<bool> {
        self.check()?;
        self.inner.remove(key).await
    }

    async fn find_expired(
        &self,
        now: OffsetDateTime,
        limit: usize,
    ) -> GrantsResult<Vec<PersistedGrant>> {
        self.check()?;
        self.inner.find_expired(now, limit).await
    }

    async fn remove_expired(
        &self,
        keys: &[String],
        now: OffsetDateTime,
    ) -> GrantsResult<Vec<String>> {
        self.check()?;
        self.inner.remove_expired(keys, now).await
    }
}

#[async_trait]
impl GrantStoreProvider for ScriptedProvider {
    type Session = ScriptedSession;

    async fn session(&self) -> GrantsResult<Self::Session> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = self.on_session.lock().unwrap().as_ref() {
            hook();
        }
        let script = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(SessionScript::Healthy);

        if script == SessionScript::Unavailable {
            return Err(GrantsError::storage("store unavailable"));
        }

        self.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedSession {
            inner: self.store.clone(),
            script,
            open_sessions: Arc::clone(&self.open_sessions),
        })
    }
}

/// Collects the `event` field of every tracing event emitted while the
/// returned guard is alive on this thread.
pub fn capture_events() -> (Arc<Mutex<Vec<String>>>, DefaultGuard) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::registry().with(EventLayer(Arc::clone(&events)));
    let guard = tracing::subscriber::set_default(subscriber);
    (events, guard)
}

struct EventLayer(Arc<Mutex<Vec<String>>>);

impl<S: tracing::Subscriber> Layer<S> for EventLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = EventName(None);
        event.record(&mut visitor);
        if let Some(name) = visitor.0 {
            self.0.lock().unwrap().push(name);
        }
    }
}

struct EventName(Option<String>);

impl Visit for EventName {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "event" {
            self.0 = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, _field: &Field, _value: &dyn fmt::Debug) {}
}
