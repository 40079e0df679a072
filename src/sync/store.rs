//! Local persisted key-value storage used by the browser runtime.

use parking_lot::Mutex;
use std::collections::HashMap;
use thiserror::Error;

/// Flag set while an email verification is outstanding.
pub const PENDING_VERIFICATION_KEY: &str = "pending_verification";
/// Email typed during the last signup attempt.
pub const LAST_SIGNUP_EMAIL_KEY: &str = "last_signup_email";
/// Serialized profile kept for fast first paint.
pub const PROFILE_CACHE_KEY: &str = "profile_cache";
/// Path to return to after a login redirect.
pub const AUTH_REDIRECT_KEY: &str = "auth_redirect_to";

/// Every auth-adjacent key the UI layer persists. Logout removes exactly these;
/// unrelated application state is never scanned or touched.
pub const AUXILIARY_KEYS: [&str; 4] = [
    PENDING_VERIFICATION_KEY,
    LAST_SIGNUP_EMAIL_KEY,
    PROFILE_CACHE_KEY,
    AUTH_REDIRECT_KEY,
];

/// Key under which the client connection persists its session record.
pub const SESSION_TOKEN_KEY: &str = "concord.auth.token";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage quota exceeded")]
    QuotaExceeded,
}

pub trait KeyValueStore: Send + Sync {
    /// # Errors
    /// Returns `StoreError` if the storage backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// # Errors
    /// Returns `StoreError` if the value cannot be persisted.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removing a missing key is not an error.
    ///
    /// # Errors
    /// Returns `StoreError` if the storage backend rejects the removal.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// In-process store; the default for native runtimes and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}
