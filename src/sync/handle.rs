//! Session handle cache for the browser runtime.
//!
//! Owns the single long-lived client connection. A handle is never repaired:
//! when it is suspected stale it is dropped and a new one is built. The
//! recreate-or-reuse decision and the construction both happen under one lock
//! with no suspension point, so concurrent callers cannot leave two handles
//! registered for change events.

use super::{
    backend::{AuthChangeEvent, ClientConnection, ClientConnector, HandleError, ListenerId},
    config::SyncConfig,
    logout::clear_auxiliary_keys,
    observer::{AuthEvent, AuthObserver, DiscardReason},
    store::KeyValueStore,
    visibility::VisibilitySource,
};
use parking_lot::Mutex;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::Instant;

/// A client connection plus the bookkeeping needed to retire it.
pub struct SessionHandle {
    generation: u64,
    created_at: Instant,
    connection: Arc<dyn ClientConnection>,
    listener: Mutex<Option<ListenerId>>,
}

impl SessionHandle {
    /// Monotonic per cache; a rebuilt handle always has a higher generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    #[must_use]
    pub fn connection(&self) -> &dyn ClientConnection {
        self.connection.as_ref()
    }

    #[must_use]
    pub fn is_registered_for_change_events(&self) -> bool {
        self.listener.lock().is_some()
    }

    fn unregister(&self) {
        if let Some(id) = self.listener.lock().take() {
            self.connection.remove_listener(id);
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("generation", &self.generation)
            .field("created_at", &self.created_at)
            .field("registered", &self.is_registered_for_change_events())
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct CacheState {
    handle: Option<Arc<SessionHandle>>,
    handle_created_at: Option<Instant>,
    is_foreground_active: bool,
    /// Set on a transition to background or when a handle is built while hidden;
    /// consumed by the next foreground acquire.
    was_backgrounded: bool,
    next_generation: u64,
}

impl CacheState {
    fn must_recreate(&self, stale_after: Duration) -> bool {
        let Some(created_at) = self.handle_created_at else {
            return true;
        };
        self.is_foreground_active && self.was_backgrounded && created_at.elapsed() > stale_after
    }
}

/// Hands out the client connection, rebuilding it when it may be corrupted.
///
/// Lifetime equals the browser runtime; construct one per runtime and share it.
pub struct HandleCache {
    connector: Arc<dyn ClientConnector>,
    visibility: Arc<dyn VisibilitySource>,
    store: Arc<dyn KeyValueStore>,
    observer: Arc<dyn AuthObserver>,
    stale_after: Duration,
    state: Arc<Mutex<CacheState>>,
    visibility_listener_installed: AtomicBool,
}

impl HandleCache {
    #[must_use]
    pub fn new(
        config: &SyncConfig,
        connector: Arc<dyn ClientConnector>,
        visibility: Arc<dyn VisibilitySource>,
        store: Arc<dyn KeyValueStore>,
        observer: Arc<dyn AuthObserver>,
    ) -> Self {
        let foreground = visibility.is_foreground_active();
        let cache = Self {
            state: Arc::new(Mutex::new(CacheState {
                handle: None,
                handle_created_at: None,
                is_foreground_active: foreground,
                // A runtime that starts hidden has already been backgrounded.
                was_backgrounded: !foreground,
                next_generation: 1,
            })),
            connector,
            visibility,
            store,
            observer,
            stale_after: config.stale_handle_after(),
            visibility_listener_installed: AtomicBool::new(false),
        };
        cache.install_visibility_listener();
        cache
    }

    /// Subscribes to visibility transitions. Safe to call repeatedly; only the
    /// first call registers a listener.
    pub fn install_visibility_listener(&self) {
        if self
            .visibility_listener_installed
            .swap(true, Ordering::AcqRel)
        {
            return;
        }
        let state = Arc::clone(&self.state);
        self.visibility
            .on_visibility_change(Arc::new(move |foreground: bool| {
                let mut state = state.lock();
                if !foreground {
                    state.was_backgrounded = true;
                }
                state.is_foreground_active = foreground;
            }));
    }

    /// Returns the cached handle, or a fresh one when none exists or when the
    /// tab was just foregrounded after a background period and the handle is
    /// older than the stale threshold.
    ///
    /// # Errors
    /// Propagates `HandleError` from the connector; construction failures are
    /// configuration defects and are not retried here.
    pub fn acquire(&self) -> Result<Arc<SessionHandle>, HandleError> {
        let mut state = self.state.lock();

        if !state.must_recreate(self.stale_after) {
            if let Some(handle) = state.handle.clone() {
                if state.is_foreground_active {
                    state.was_backgrounded = false;
                }
                return Ok(handle);
            }
        }

        if let Some(stale) = state.handle.take() {
            state.handle_created_at = None;
            self.retire(&stale, DiscardReason::Stale);
        }

        let connection = self.connector.connect()?;
        let generation = state.next_generation;
        state.next_generation += 1;

        let listener = connection.on_auth_change(Arc::new({
            let store = Arc::clone(&self.store);
            let observer = Arc::clone(&self.observer);
            move |event: AuthChangeEvent| {
                observer.record(AuthEvent::AuthChanged { generation, event });
                if event == AuthChangeEvent::SignedOut {
                    clear_auxiliary_keys(store.as_ref(), observer.as_ref());
                }
            }
        }));

        let created_at = Instant::now();
        let handle = Arc::new(SessionHandle {
            generation,
            created_at,
            connection,
            listener: Mutex::new(Some(listener)),
        });

        state.handle = Some(Arc::clone(&handle));
        state.handle_created_at = Some(created_at);
        // A handle built while hidden still owes a check on the next refocus.
        state.was_backgrounded = !state.is_foreground_active;
        self.observer.record(AuthEvent::HandleCreated { generation });

        Ok(handle)
    }

    /// Drops the held handle so the next `acquire` rebuilds. A no-op when no
    /// handle is held.
    pub fn invalidate(&self) {
        let discarded = {
            let mut state = self.state.lock();
            state.handle_created_at = None;
            state.handle.take()
        };
        if let Some(handle) = discarded {
            self.retire(&handle, DiscardReason::Invalidated);
        }
    }

    /// The held handle, without creating or checking staleness.
    #[must_use]
    pub fn current(&self) -> Option<Arc<SessionHandle>> {
        self.state.lock().handle.clone()
    }

    #[must_use]
    pub fn handle_created_at(&self) -> Option<Instant> {
        self.state.lock().handle_created_at
    }

    #[must_use]
    pub fn is_foreground_active(&self) -> bool {
        self.state.lock().is_foreground_active
    }

    #[must_use]
    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    fn retire(&self, handle: &SessionHandle, reason: DiscardReason) {
        handle.unregister();
        self.observer.record(AuthEvent::HandleDiscarded {
            generation: handle.generation,
            reason,
        });
    }
}

impl std::fmt::Debug for HandleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleCache")
            .field("stale_after", &self.stale_after)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}
