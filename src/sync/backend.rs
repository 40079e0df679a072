//! Boundary contracts with the managed auth/content backend.

use super::state::{Identity, Profile, Session};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("network error: {0}")]
    Network(String),
    #[error("timed out after {0} ms")]
    Timeout(u128),
    #[error("request failed ({status}): {message}")]
    Http { status: u16, message: String },
    #[error("invalid response: {0}")]
    Parse(String),
    #[error("local storage error: {0}")]
    Storage(String),
    /// The requested row does not exist. Callers map this to an absent value.
    #[error("row not found")]
    NotFound,
}

/// Errors building a client connection. These indicate deployment defects and
/// are propagated rather than retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandleError {
    #[error("invalid backend configuration: {0}")]
    Config(String),
    #[error("failed to initialize backend client: {0}")]
    Init(String),
}

/// The three logical lookups plus sign-out.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// # Errors
    /// Returns `BackendError` on transport or decoding failures.
    async fn get_identity(&self) -> Result<Option<Identity>, BackendError>;

    /// # Errors
    /// Returns `BackendError` on transport or decoding failures.
    async fn get_session(&self) -> Result<Option<Session>, BackendError>;

    /// Looks up a profile by identity id. With `exclude_deleted`, soft-deleted
    /// rows are treated as missing.
    ///
    /// # Errors
    /// Returns `BackendError::NotFound` or `Ok(None)` for a missing row, and other
    /// variants on transport or decoding failures.
    async fn get_profile_by_id(
        &self,
        id: &str,
        exclude_deleted: bool,
    ) -> Result<Option<Profile>, BackendError>;

    /// # Errors
    /// Returns `BackendError` if the backend could not revoke the session.
    async fn sign_out(&self) -> Result<(), BackendError>;
}

/// Session transitions published by a client connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthChangeEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

impl AuthChangeEvent {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SignedIn => "signed_in",
            Self::SignedOut => "signed_out",
            Self::TokenRefreshed => "token_refreshed",
            Self::UserUpdated => "user_updated",
        }
    }
}

pub type AuthChangeListener = Arc<dyn Fn(AuthChangeEvent) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A long-lived client-side connection: backend calls plus change events.
pub trait ClientConnection: AuthBackend {
    fn on_auth_change(&self, listener: AuthChangeListener) -> ListenerId;

    /// Unknown ids are ignored.
    fn remove_listener(&self, id: ListenerId);
}

/// Builds client connections for the handle cache.
pub trait ClientConnector: Send + Sync {
    /// # Errors
    /// Returns `HandleError` when the connection cannot be constructed.
    fn connect(&self) -> Result<Arc<dyn ClientConnection>, HandleError>;
}

/// Listener bookkeeping shared by connection implementations.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, AuthChangeListener)>>,
}

impl ListenerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: AuthChangeListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }

    pub fn remove(&self, id: ListenerId) {
        self.listeners.lock().retain(|(existing, _)| *existing != id);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    /// Invokes every listener outside the lock so listeners may re-enter.
    pub fn emit(&self, event: AuthChangeEvent) {
        let listeners: Vec<AuthChangeListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}
