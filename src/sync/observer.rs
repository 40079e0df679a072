//! Observability port for the synchronizer.
//!
//! Components report what happened through `AuthObserver` instead of logging
//! directly, so tests can assert on emitted events. `TracingObserver` is the
//! production sink.

use super::backend::AuthChangeEvent;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

/// Why a cached session handle was dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscardReason {
    /// Foregrounded after a background period with a handle past the threshold.
    Stale,
    /// Dropped by the logout coordinator.
    Invalidated,
}

impl DiscardReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stale => "stale",
            Self::Invalidated => "invalidated",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthEvent {
    HandleCreated {
        generation: u64,
    },
    HandleDiscarded {
        generation: u64,
        reason: DiscardReason,
    },
    AuthChanged {
        generation: u64,
        event: AuthChangeEvent,
    },
    /// Identity/session resolution failed or timed out; the empty state was used.
    ResolutionDegraded {
        flavor: &'static str,
        reason: String,
    },
    /// Profile lookup failed or timed out; authentication was kept.
    ProfileLookupFailed {
        flavor: &'static str,
        identity_id: String,
        reason: String,
    },
    DriftDetected {
        issues: Vec<String>,
    },
    SignOutFailed {
        reason: String,
    },
    KeyRemovalFailed {
        key: String,
        reason: String,
    },
}

pub trait AuthObserver: Send + Sync {
    fn record(&self, event: AuthEvent);
}

/// Forwards events to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl AuthObserver for TracingObserver {
    fn record(&self, event: AuthEvent) {
        match event {
            AuthEvent::HandleCreated { generation } => {
                debug!(generation, "session handle created");
            }
            AuthEvent::HandleDiscarded { generation, reason } => {
                info!(generation, reason = reason.as_str(), "session handle discarded");
            }
            AuthEvent::AuthChanged { generation, event } => {
                info!(generation, event = event.as_str(), "auth state changed");
            }
            AuthEvent::ResolutionDegraded { flavor, reason } => {
                warn!(flavor, "auth resolution degraded to signed out: {reason}");
            }
            AuthEvent::ProfileLookupFailed {
                flavor,
                identity_id,
                reason,
            } => {
                error!(flavor, identity_id = %identity_id, "profile lookup failed: {reason}");
            }
            AuthEvent::DriftDetected { issues } => {
                warn!(count = issues.len(), "auth state drift: {}", issues.join("; "));
            }
            AuthEvent::SignOutFailed { reason } => {
                error!("backend sign-out failed: {reason}");
            }
            AuthEvent::KeyRemovalFailed { key, reason } => {
                warn!(key = %key, "failed to remove persisted key: {reason}");
            }
        }
    }
}

/// Keeps every event in memory, in order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<AuthEvent>>,
}

impl RecordingObserver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<AuthEvent> {
        self.events.lock().clone()
    }

    /// Number of recorded events matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&AuthEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|event| predicate(event)).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl AuthObserver for RecordingObserver {
    fn record(&self, event: AuthEvent) {
        self.events.lock().push(event);
    }
}
