//! Produces one `AuthState` from one connection.
//!
//! Flow Overview:
//! 1. Resolve identity and session concurrently. Any error or timeout yields the
//!    empty state; callers never see an error from this path.
//! 2. If either is absent, stop: no profile lookup for a principal without a
//!    valid session.
//! 3. Look up the profile, excluding soft-deleted rows. A missing row or a failed
//!    lookup leaves the profile absent without touching authentication.
//!
//! The client flavor bounds steps 1 and 3 with their own timeouts because the
//! browser runtime can stall indefinitely (for example across laptop sleep). A
//! timed-out lookup future is dropped, which cancels it. The server flavor relies
//! on the request-level timeout enforced upstream.
//!
//! The reader is stateless and does not deduplicate concurrent calls.

use super::{
    backend::{AuthBackend, BackendError},
    config::SyncConfig,
    observer::{AuthEvent, AuthObserver},
    state::AuthState,
};
use std::{future::Future, sync::Arc, time::Duration};
use tokio::time::timeout;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReaderFlavor {
    Server,
    Client {
        identity_timeout: Duration,
        profile_timeout: Duration,
    },
}

impl ReaderFlavor {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Client { .. } => "client",
        }
    }

    fn identity_timeout(self) -> Option<Duration> {
        match self {
            Self::Server => None,
            Self::Client {
                identity_timeout, ..
            } => Some(identity_timeout),
        }
    }

    fn profile_timeout(self) -> Option<Duration> {
        match self {
            Self::Server => None,
            Self::Client {
                profile_timeout, ..
            } => Some(profile_timeout),
        }
    }
}

#[derive(Clone)]
pub struct StateReader {
    flavor: ReaderFlavor,
    observer: Arc<dyn AuthObserver>,
}

impl StateReader {
    #[must_use]
    pub fn server(observer: Arc<dyn AuthObserver>) -> Self {
        Self {
            flavor: ReaderFlavor::Server,
            observer,
        }
    }

    #[must_use]
    pub fn client(config: &SyncConfig, observer: Arc<dyn AuthObserver>) -> Self {
        Self {
            flavor: ReaderFlavor::Client {
                identity_timeout: config.identity_timeout(),
                profile_timeout: config.profile_timeout(),
            },
            observer,
        }
    }

    #[must_use]
    pub fn flavor(&self) -> ReaderFlavor {
        self.flavor
    }

    /// Resolves the current auth state. Never fails; degraded lookups produce
    /// the empty state or an absent profile.
    pub async fn read(&self, backend: &dyn AuthBackend) -> AuthState {
        let resolved = bounded(self.flavor.identity_timeout(), async {
            let (identity, session) = tokio::join!(backend.get_identity(), backend.get_session());
            Ok::<_, BackendError>((identity?, session?))
        })
        .await;

        let (identity, session) = match resolved {
            Ok((Some(identity), Some(session))) => (identity, session),
            Ok(_) => return AuthState::empty(),
            Err(err) => {
                self.observer.record(AuthEvent::ResolutionDegraded {
                    flavor: self.flavor.as_str(),
                    reason: err.to_string(),
                });
                return AuthState::empty();
            }
        };

        let profile = match bounded(
            self.flavor.profile_timeout(),
            backend.get_profile_by_id(&identity.id, true),
        )
        .await
        {
            Ok(profile) => profile,
            Err(BackendError::NotFound) => None,
            Err(err) => {
                self.observer.record(AuthEvent::ProfileLookupFailed {
                    flavor: self.flavor.as_str(),
                    identity_id: identity.id.clone(),
                    reason: err.to_string(),
                });
                None
            }
        };

        AuthState::authenticated(identity, session, profile)
    }
}

impl std::fmt::Debug for StateReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateReader")
            .field("flavor", &self.flavor)
            .finish_non_exhaustive()
    }
}

/// Runs `operation`, racing it against `limit` when one is set.
async fn bounded<T, F>(limit: Option<Duration>, operation: F) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    match limit {
        Some(limit) => timeout(limit, operation)
            .await
            .unwrap_or(Err(BackendError::Timeout(limit.as_millis()))),
        None => operation.await,
    }
}
