//! HTTP adapter for the managed auth/content backend.
//!
//! `HttpBackend` speaks the backend's REST dialect (`auth/v1/*` for identity and
//! sign-out, `rest/v1/profiles` for profile rows) and keeps the session record
//! in a [`TokenSource`]: request cookies on the server, a key-value store in the
//! browser runtime.

mod config;
mod http;
mod tokens;

pub use self::config::BackendConfig;
pub use self::http::{HttpBackend, HttpConnector};
pub use self::tokens::{StoredSession, TokenSource};
