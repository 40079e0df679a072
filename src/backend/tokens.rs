use crate::sync::{
    backend::BackendError,
    cookies::{decode_cookie_value, encode_cookie_value, CookieAccessor, CookieOptions},
    state::{unix_seconds_now, Session},
    store::KeyValueStore,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The persisted session record. Only [`Session`] metadata ever leaves the
/// backend adapter; the tokens stay here.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user_id: String,
    /// Unix seconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
    /// Unix seconds.
    #[serde(default)]
    pub issued_at: Option<i64>,
}

impl StoredSession {
    #[must_use]
    pub fn session(&self) -> Session {
        Session {
            user_id: self.user_id.clone(),
            expires_at: self.expires_at,
            issued_at: self.issued_at,
        }
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.session().is_expired_at(unix_seconds_now())
    }
}

impl std::fmt::Debug for StoredSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredSession")
            .field("access_token", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Where a connection keeps its session record.
#[derive(Clone)]
pub enum TokenSource {
    /// Server flavor: the record lives in a cookie of the current request.
    Cookies {
        jar: Arc<dyn CookieAccessor>,
        name: String,
        options: CookieOptions,
    },
    /// Browser flavor: the record lives in local storage.
    Store {
        store: Arc<dyn KeyValueStore>,
        key: String,
    },
}

impl TokenSource {
    #[must_use]
    pub fn cookies(jar: Arc<dyn CookieAccessor>, name: &str, options: CookieOptions) -> Self {
        Self::Cookies {
            jar,
            name: name.to_string(),
            options,
        }
    }

    #[must_use]
    pub fn store(store: Arc<dyn KeyValueStore>, key: &str) -> Self {
        Self::Store {
            store,
            key: key.to_string(),
        }
    }

    /// # Errors
    /// Returns `BackendError::Storage` if the store cannot be read and
    /// `BackendError::Parse` if the record is malformed.
    pub fn load(&self) -> Result<Option<StoredSession>, BackendError> {
        let raw = match self {
            Self::Cookies { jar, name, .. } => jar
                .get(name)
                .map(|encoded| decode_cookie_value(&encoded)),
            Self::Store { store, key } => store
                .get(key)
                .map_err(|err| BackendError::Storage(err.to_string()))?,
        };

        match raw {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|err| BackendError::Parse(format!("malformed session record: {err}"))),
            _ => Ok(None),
        }
    }

    /// # Errors
    /// Returns `BackendError::Storage` if the record cannot be persisted.
    pub fn save(&self, session: &StoredSession) -> Result<(), BackendError> {
        let raw = serde_json::to_string(session)
            .map_err(|err| BackendError::Parse(format!("failed to encode session record: {err}")))?;
        match self {
            Self::Cookies { jar, name, options } => {
                let options = match session.expires_at {
                    Some(expires_at) => options
                        .clone()
                        .with_max_age((expires_at - unix_seconds_now()).max(0)),
                    None => options.clone(),
                };
                jar.set(name, &encode_cookie_value(&raw), &options);
                Ok(())
            }
            Self::Store { store, key } => store
                .set(key, &raw)
                .map_err(|err| BackendError::Storage(err.to_string())),
        }
    }

    /// # Errors
    /// Returns `BackendError::Storage` if the store rejects the removal.
    pub fn clear(&self) -> Result<(), BackendError> {
        match self {
            Self::Cookies { jar, name, options } => {
                jar.remove(name, options);
                Ok(())
            }
            Self::Store { store, key } => store
                .remove(key)
                .map_err(|err| BackendError::Storage(err.to_string())),
        }
    }
}

impl std::fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cookies { name, .. } => f.debug_struct("Cookies").field("name", name).finish(),
            Self::Store { key, .. } => f.debug_struct("Store").field("key", key).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{cookies::RequestCookies, store::MemoryStore};

    fn record(expires_in: i64) -> StoredSession {
        StoredSession {
            access_token: "secret-token".to_string(),
            refresh_token: None,
            user_id: "u1".to_string(),
            expires_at: Some(unix_seconds_now() + expires_in),
            issued_at: None,
        }
    }

    #[test]
    fn store_source_round_trips_and_clears() {
        let store = Arc::new(MemoryStore::new());
        let source = TokenSource::store(store.clone(), "token");

        assert_eq!(source.load().unwrap(), None);
        let saved = record(60);
        source.save(&saved).unwrap();
        assert_eq!(source.load().unwrap(), Some(saved));
        source.clear().unwrap();
        assert!(!store.contains("token"));
    }

    #[test]
    fn cookie_source_writes_max_age_and_expires_on_clear() {
        let jar = Arc::new(RequestCookies::default());
        let source = TokenSource::cookies(jar.clone(), "auth", CookieOptions::session(true));

        source.save(&record(3600)).unwrap();
        let loaded = source.load().unwrap().unwrap();
        assert_eq!(loaded.user_id, "u1");
        assert!(!loaded.is_expired());

        source.clear().unwrap();
        assert_eq!(source.load().unwrap(), None);

        let cookies = jar.set_cookie_values();
        assert_eq!(cookies.len(), 2);
        assert!(cookies[0].contains("Max-Age=3600") || cookies[0].contains("Max-Age=3599"));
        assert!(cookies[1].starts_with("auth=; Path=/"));
        assert!(cookies[1].contains("Max-Age=0"));
    }

    #[test]
    fn malformed_record_is_a_parse_error() {
        let store = Arc::new(MemoryStore::new());
        store.set("token", "{not json").unwrap();
        let source = TokenSource::store(store, "token");
        assert!(matches!(source.load(), Err(BackendError::Parse(_))));
    }

    #[test]
    fn debug_output_hides_tokens() {
        let rendered = format!("{:?}", record(60));
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("u1"));
    }
}
