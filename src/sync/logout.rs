//! Logout coordination: make "signed out" true everywhere.
//!
//! Flow Overview:
//! 1. Revoke the session on the backend through the cached handle (best-effort).
//! 2. Drop the cached handle so the next acquire rebuilds.
//! 3. Remove every auxiliary persisted key, one at a time. When no connection
//!    could be built in step 1, the stored session record is removed as well.
//!
//! Steps 2 and 3 run back to back with no suspension point, so no other task
//! can observe a state where the handle is gone but the keys are not.

use super::{
    handle::HandleCache,
    observer::{AuthEvent, AuthObserver},
    store::{KeyValueStore, AUXILIARY_KEYS, SESSION_TOKEN_KEY},
};
use std::sync::Arc;

/// What happened during a sign-out. Informational only; sign-out never fails.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SignOutReport {
    /// The backend acknowledged the revocation.
    pub backend_revoked: bool,
    /// Keys whose removal failed.
    pub failed_keys: Vec<String>,
}

impl SignOutReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.backend_revoked && self.failed_keys.is_empty()
    }
}

/// Removes each auxiliary key independently; one failing key does not stop the
/// rest. Returns the keys that could not be removed.
pub fn clear_auxiliary_keys(store: &dyn KeyValueStore, observer: &dyn AuthObserver) -> Vec<String> {
    let mut failed = Vec::new();
    for key in AUXILIARY_KEYS {
        if let Err(err) = store.remove(key) {
            observer.record(AuthEvent::KeyRemovalFailed {
                key: key.to_string(),
                reason: err.to_string(),
            });
            failed.push(key.to_string());
        }
    }
    failed
}

pub struct LogoutCoordinator {
    cache: Arc<HandleCache>,
    store: Arc<dyn KeyValueStore>,
    observer: Arc<dyn AuthObserver>,
}

impl LogoutCoordinator {
    #[must_use]
    pub fn new(
        cache: Arc<HandleCache>,
        store: Arc<dyn KeyValueStore>,
        observer: Arc<dyn AuthObserver>,
    ) -> Self {
        Self {
            cache,
            store,
            observer,
        }
    }

    /// Signs out on the backend and clears all local derived state.
    ///
    /// Safe to call concurrently or repeatedly: dropping an absent handle and
    /// removing an absent key are no-ops.
    pub async fn sign_out_everywhere(&self) -> SignOutReport {
        let mut failed_keys = Vec::new();
        let backend_revoked = match self.cache.acquire() {
            Ok(handle) => match handle.connection().sign_out().await {
                Ok(()) => true,
                Err(err) => {
                    self.observer.record(AuthEvent::SignOutFailed {
                        reason: err.to_string(),
                    });
                    false
                }
            },
            Err(err) => {
                self.observer.record(AuthEvent::SignOutFailed {
                    reason: err.to_string(),
                });
                // No connection cleared the session record, so drop it here.
                if let Err(err) = self.store.remove(SESSION_TOKEN_KEY) {
                    self.observer.record(AuthEvent::KeyRemovalFailed {
                        key: SESSION_TOKEN_KEY.to_string(),
                        reason: err.to_string(),
                    });
                    failed_keys.push(SESSION_TOKEN_KEY.to_string());
                }
                false
            }
        };

        self.cache.invalidate();
        failed_keys.extend(clear_auxiliary_keys(
            self.store.as_ref(),
            self.observer.as_ref(),
        ));

        SignOutReport {
            backend_revoked,
            failed_keys,
        }
    }
}

impl std::fmt::Debug for LogoutCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogoutCoordinator")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
