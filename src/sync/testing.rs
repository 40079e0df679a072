//! In-memory backend and connector doubles for exercising the synchronizer
//! without a network.

use super::{
    backend::{
        AuthBackend, AuthChangeEvent, AuthChangeListener, BackendError, ClientConnection,
        ClientConnector, HandleError, ListenerId, ListenerRegistry,
    },
    state::{Identity, Profile, Session},
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

#[derive(Clone, Debug)]
struct Reply<T> {
    result: Result<T, BackendError>,
    delay: Duration,
}

impl<T: Clone> Reply<T> {
    fn ok(value: T) -> Self {
        Self {
            result: Ok(value),
            delay: Duration::ZERO,
        }
    }

    async fn play(&self) -> Result<T, BackendError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result.clone()
    }
}

/// Scripted backend. Each lookup returns its configured result after its
/// configured delay; every call is counted.
#[derive(Debug)]
pub struct FakeBackend {
    identity: Mutex<Reply<Option<Identity>>>,
    session: Mutex<Reply<Option<Session>>>,
    profile: Mutex<Reply<Option<Profile>>>,
    sign_out: Mutex<Reply<()>>,
    identity_calls: AtomicUsize,
    session_calls: AtomicUsize,
    profile_calls: AtomicUsize,
    sign_out_calls: AtomicUsize,
    profile_queries: Mutex<Vec<(String, bool)>>,
    listeners: ListenerRegistry,
}

impl FakeBackend {
    /// A backend with nobody signed in.
    #[must_use]
    pub fn new() -> Self {
        Self {
            identity: Mutex::new(Reply::ok(None)),
            session: Mutex::new(Reply::ok(None)),
            profile: Mutex::new(Reply::ok(None)),
            sign_out: Mutex::new(Reply::ok(())),
            identity_calls: AtomicUsize::new(0),
            session_calls: AtomicUsize::new(0),
            profile_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
            profile_queries: Mutex::new(Vec::new()),
            listeners: ListenerRegistry::new(),
        }
    }

    /// A backend with `identity`, a matching session and optionally a profile.
    #[must_use]
    pub fn signed_in(identity: Identity, profile: Option<Profile>) -> Self {
        let backend = Self::new();
        backend.set_session(Ok(Some(Session {
            user_id: identity.id.clone(),
            expires_at: None,
            issued_at: None,
        })));
        backend.set_identity(Ok(Some(identity)));
        backend.set_profile(Ok(profile));
        backend
    }

    pub fn set_identity(&self, result: Result<Option<Identity>, BackendError>) {
        self.identity.lock().result = result;
    }

    pub fn set_identity_delay(&self, delay: Duration) {
        self.identity.lock().delay = delay;
    }

    pub fn set_session(&self, result: Result<Option<Session>, BackendError>) {
        self.session.lock().result = result;
    }

    pub fn set_session_delay(&self, delay: Duration) {
        self.session.lock().delay = delay;
    }

    pub fn set_profile(&self, result: Result<Option<Profile>, BackendError>) {
        self.profile.lock().result = result;
    }

    pub fn set_profile_delay(&self, delay: Duration) {
        self.profile.lock().delay = delay;
    }

    pub fn set_sign_out(&self, result: Result<(), BackendError>) {
        self.sign_out.lock().result = result;
    }

    #[must_use]
    pub fn identity_calls(&self) -> usize {
        self.identity_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn session_calls(&self) -> usize {
        self.session_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn profile_calls(&self) -> usize {
        self.profile_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }

    /// `(id, exclude_deleted)` for every profile lookup, in order.
    #[must_use]
    pub fn profile_queries(&self) -> Vec<(String, bool)> {
        self.profile_queries.lock().clone()
    }

    #[must_use]
    pub fn live_listeners(&self) -> usize {
        self.listeners.len()
    }

    /// Publishes an auth change as if it came from another tab.
    pub fn emit(&self, event: AuthChangeEvent) {
        self.listeners.emit(event);
    }
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthBackend for FakeBackend {
    async fn get_identity(&self) -> Result<Option<Identity>, BackendError> {
        self.identity_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.identity.lock().clone();
        reply.play().await
    }

    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        self.session_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.session.lock().clone();
        reply.play().await
    }

    async fn get_profile_by_id(
        &self,
        id: &str,
        exclude_deleted: bool,
    ) -> Result<Option<Profile>, BackendError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        self.profile_queries
            .lock()
            .push((id.to_string(), exclude_deleted));
        let reply = self.profile.lock().clone();
        reply.play().await
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.sign_out.lock().clone();
        reply.play().await?;
        self.set_identity(Ok(None));
        self.set_session(Ok(None));
        self.listeners.emit(AuthChangeEvent::SignedOut);
        Ok(())
    }
}

impl ClientConnection for FakeBackend {
    fn on_auth_change(&self, listener: AuthChangeListener) -> ListenerId {
        self.listeners.add(listener)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.remove(id);
    }
}

/// Connector that always hands out the same shared `FakeBackend`.
#[derive(Debug)]
pub struct FakeConnector {
    backend: Arc<FakeBackend>,
    connects: AtomicUsize,
    next_error: Mutex<Option<HandleError>>,
}

impl FakeConnector {
    #[must_use]
    pub fn new(backend: FakeBackend) -> Self {
        Self {
            backend: Arc::new(backend),
            connects: AtomicUsize::new(0),
            next_error: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<FakeBackend> {
        &self.backend
    }

    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn live_listeners(&self) -> usize {
        self.backend.live_listeners()
    }

    /// The next `connect` fails with `error`; later calls succeed again.
    pub fn fail_next_connect(&self, error: HandleError) {
        *self.next_error.lock() = Some(error);
    }
}

impl ClientConnector for FakeConnector {
    fn connect(&self) -> Result<Arc<dyn ClientConnection>, HandleError> {
        if let Some(error) = self.next_error.lock().take() {
            return Err(error);
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        let backend: Arc<dyn ClientConnection> = self.backend.clone();
        Ok(backend)
    }
}
