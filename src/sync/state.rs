//! Normalized auth state produced by both the server and client readers.
//!
//! An `AuthState` is built once and never mutated. The only constructors enforce
//! that `is_authenticated` holds iff both identity and session are present, so a
//! partially resolved state (session without identity, or the reverse) collapses
//! to the empty state instead of being represented.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use utoipa::ToSchema;

/// Authenticated principal as reported by the backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
}

/// Proof-of-authentication metadata. The raw token stays with the connection
/// that owns it and is never copied into the state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Session {
    pub user_id: String,
    /// Unix seconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
    /// Unix seconds.
    #[serde(default)]
    pub issued_at: Option<i64>,
}

impl Session {
    /// Returns `true` once `now_unix` has reached the expiry, if one is known.
    #[must_use]
    pub fn is_expired_at(&self, now_unix: i64) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now_unix)
    }
}

/// Application-level user record keyed by identity id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Immutable snapshot of who is logged in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(from = "AuthStateWire")]
pub struct AuthState {
    identity: Option<Identity>,
    profile: Option<Profile>,
    session: Option<Session>,
    is_authenticated: bool,
    is_email_verified: bool,
    /// Unix milliseconds at construction.
    last_updated_ms: i64,
}

impl AuthState {
    /// The safe fallback: nobody is logged in.
    #[must_use]
    pub fn empty() -> Self {
        Self::stamped(None, None, None, unix_millis_now())
    }

    /// Builds an authenticated state. `profile` may be absent while the row is
    /// missing or its lookup failed.
    #[must_use]
    pub fn authenticated(identity: Identity, session: Session, profile: Option<Profile>) -> Self {
        Self::stamped(Some(identity), Some(session), profile, unix_millis_now())
    }

    /// Assembles a state from independently resolved parts. Any missing half of
    /// the identity/session pair yields the empty state, dropping the rest.
    #[must_use]
    pub fn from_parts(
        identity: Option<Identity>,
        session: Option<Session>,
        profile: Option<Profile>,
    ) -> Self {
        Self::stamped(identity, session, profile, unix_millis_now())
    }

    fn stamped(
        identity: Option<Identity>,
        session: Option<Session>,
        profile: Option<Profile>,
        last_updated_ms: i64,
    ) -> Self {
        match (identity, session) {
            (Some(identity), Some(session)) => Self {
                is_email_verified: identity.email_verified,
                identity: Some(identity),
                profile,
                session: Some(session),
                is_authenticated: true,
                last_updated_ms,
            },
            _ => Self {
                identity: None,
                profile: None,
                session: None,
                is_authenticated: false,
                is_email_verified: false,
                last_updated_ms,
            },
        }
    }

    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    #[must_use]
    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated
    }

    #[must_use]
    pub fn is_email_verified(&self) -> bool {
        self.is_email_verified
    }

    #[must_use]
    pub fn last_updated_ms(&self) -> i64 {
        self.last_updated_ms
    }

    /// Identity id, if any.
    #[must_use]
    pub fn identity_id(&self) -> Option<&str> {
        self.identity.as_ref().map(|identity| identity.id.as_str())
    }

    /// Profile id, if any.
    #[must_use]
    pub fn profile_id(&self) -> Option<&str> {
        self.profile.as_ref().map(|profile| profile.id.as_str())
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::empty()
    }
}

/// Shape accepted from clients. Derived flags are recomputed on the way in so a
/// caller can never smuggle in `is_authenticated = true` without both halves.
#[derive(Deserialize)]
struct AuthStateWire {
    #[serde(default)]
    identity: Option<Identity>,
    #[serde(default)]
    profile: Option<Profile>,
    #[serde(default)]
    session: Option<Session>,
    #[serde(default)]
    last_updated_ms: Option<i64>,
}

impl From<AuthStateWire> for AuthState {
    fn from(wire: AuthStateWire) -> Self {
        Self::stamped(
            wire.identity,
            wire.session,
            wire.profile,
            wire.last_updated_ms.unwrap_or_else(unix_millis_now),
        )
    }
}

pub(crate) fn unix_millis_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}

pub(crate) fn unix_seconds_now() -> i64 {
    unix_millis_now() / 1000
}
