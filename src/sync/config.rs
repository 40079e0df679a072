//! Policy settings for the synchronizer.

use std::time::Duration;

const DEFAULT_STALE_HANDLE_SECONDS: u64 = 30;
const DEFAULT_IDENTITY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_PROFILE_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_SESSION_COOKIE: &str = "concord-auth-token";

/// Staleness threshold and timeouts. The stale threshold should exceed a typical
/// tab-switch dwell time and stay well under the session token lifetime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    stale_handle_after: Duration,
    identity_timeout: Duration,
    profile_timeout: Duration,
    request_timeout: Duration,
    session_cookie_name: String,
}

impl SyncConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            stale_handle_after: Duration::from_secs(DEFAULT_STALE_HANDLE_SECONDS),
            identity_timeout: Duration::from_millis(DEFAULT_IDENTITY_TIMEOUT_MS),
            profile_timeout: Duration::from_millis(DEFAULT_PROFILE_TIMEOUT_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            session_cookie_name: DEFAULT_SESSION_COOKIE.to_string(),
        }
    }

    #[must_use]
    pub fn with_stale_handle_after(mut self, threshold: Duration) -> Self {
        self.stale_handle_after = threshold;
        self
    }

    #[must_use]
    pub fn with_identity_timeout(mut self, timeout: Duration) -> Self {
        self.identity_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_profile_timeout(mut self, timeout: Duration) -> Self {
        self.profile_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_session_cookie_name(mut self, name: String) -> Self {
        self.session_cookie_name = name;
        self
    }

    #[must_use]
    pub fn stale_handle_after(&self) -> Duration {
        self.stale_handle_after
    }

    #[must_use]
    pub fn identity_timeout(&self) -> Duration {
        self.identity_timeout
    }

    #[must_use]
    pub fn profile_timeout(&self) -> Duration {
        self.profile_timeout
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    #[must_use]
    pub fn session_cookie_name(&self) -> &str {
        &self.session_cookie_name
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
