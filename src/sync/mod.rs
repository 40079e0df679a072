//! Dual-context auth state synchronization.
//!
//! The same question, "who is logged in", is answered in two places: a stateless
//! server context that recovers the session from request cookies, and a
//! long-lived browser runtime that keeps a cached client connection. This module
//! makes both answers trustworthy and comparable.
//!
//! - [`StateReader`] resolves one [`AuthState`] from one connection, server or
//!   client flavored, and never fails.
//! - [`HandleCache`] owns the browser's connection and rebuilds it when the tab
//!   returns from the background with a handle older than the stale threshold.
//! - [`validate`] reports drift between a server and a client state.
//! - [`LogoutCoordinator`] signs out and clears every derived cache.

pub mod backend;
pub mod config;
pub mod cookies;
pub mod handle;
pub mod logout;
pub mod observer;
pub mod reader;
pub mod state;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod validator;
pub mod visibility;

pub use self::backend::{
    AuthBackend, AuthChangeEvent, BackendError, ClientConnection, ClientConnector, HandleError,
};
pub use self::config::SyncConfig;
pub use self::cookies::{CookieAccessor, CookieOptions, RequestCookies};
pub use self::handle::{HandleCache, SessionHandle};
pub use self::logout::{LogoutCoordinator, SignOutReport};
pub use self::observer::{AuthEvent, AuthObserver, RecordingObserver, TracingObserver};
pub use self::reader::{ReaderFlavor, StateReader};
pub use self::state::{AuthState, Identity, Profile, Session};
pub use self::store::{KeyValueStore, MemoryStore};
pub use self::validator::{reconcile, report_drift, validate, ConsistencyReport};
pub use self::visibility::{VisibilityChannel, VisibilitySource};
