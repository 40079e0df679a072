use super::{
    config::BackendConfig,
    tokens::{StoredSession, TokenSource},
};
use crate::sync::{
    backend::{
        AuthBackend, AuthChangeEvent, AuthChangeListener, BackendError, ClientConnection,
        ClientConnector, HandleError, ListenerId, ListenerRegistry,
    },
    state::{Identity, Profile, Session},
    store::{KeyValueStore, SESSION_TOKEN_KEY},
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Maximum number of error body characters kept in `BackendError::Http`.
const MAX_ERROR_CHARS: usize = 200;

const USER_PATH: &str = "auth/v1/user";
const LOGOUT_PATH: &str = "auth/v1/logout";
const PROFILES_PATH: &str = "rest/v1/profiles";

/// User record returned by `GET auth/v1/user`.
#[derive(Deserialize)]
struct UserRecord {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_confirmed_at: Option<String>,
}

impl From<UserRecord> for Identity {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            email: user.email,
            email_verified: user.email_confirmed_at.is_some(),
        }
    }
}

/// One connection to the backend, bound to one token source.
pub struct HttpBackend {
    client: Client,
    config: BackendConfig,
    tokens: TokenSource,
    listeners: ListenerRegistry,
}

impl HttpBackend {
    #[must_use]
    pub fn new(client: Client, config: BackendConfig, tokens: TokenSource) -> Self {
        Self {
            client,
            config,
            tokens,
            listeners: ListenerRegistry::new(),
        }
    }

    /// Persists a session obtained from a login or refresh and notifies
    /// listeners. A record for the same user counts as a refresh.
    ///
    /// # Errors
    /// Returns `BackendError::Storage` if the record cannot be persisted.
    pub fn store_session(&self, session: &StoredSession) -> Result<(), BackendError> {
        let previous = self.tokens.load().ok().flatten();
        self.tokens.save(session)?;

        let event = match previous {
            Some(previous) if previous.user_id == session.user_id => {
                AuthChangeEvent::TokenRefreshed
            }
            _ => AuthChangeEvent::SignedIn,
        };
        self.listeners.emit(event);
        Ok(())
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenSource {
        &self.tokens
    }

    /// The access token of a live session, if any.
    fn access_token(&self) -> Result<Option<String>, BackendError> {
        Ok(self
            .tokens
            .load()?
            .filter(|session| !session.is_expired())
            .map(|session| session.access_token))
    }

    fn endpoint(&self, path: &str) -> Result<url::Url, BackendError> {
        self.config
            .endpoint(path)
            .map_err(|err| BackendError::Parse(err.to_string()))
    }

    fn authorized(&self, request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        let anon_key = self.config.anon_key().expose_secret();
        request
            .header("apikey", anon_key)
            .bearer_auth(token.unwrap_or(anon_key))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, BackendError> {
        request.send().await.map_err(|err| self.map_request_error(&err))
    }

    fn map_request_error(&self, err: &reqwest::Error) -> BackendError {
        if err.is_timeout() {
            BackendError::Timeout(self.config.request_timeout().as_millis())
        } else {
            BackendError::Network(format!("unable to reach the backend: {err}"))
        }
    }
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.config.base_url().as_str())
            .field("tokens", &self.tokens)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[async_trait]
impl AuthBackend for HttpBackend {
    #[instrument(skip(self))]
    async fn get_identity(&self) -> Result<Option<Identity>, BackendError> {
        let Some(token) = self.access_token()? else {
            return Ok(None);
        };

        let url = self.endpoint(USER_PATH)?;
        let response = self
            .send(self.authorized(self.client.get(url), Some(token.as_str())))
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                debug!("backend rejected the access token");
                Ok(None)
            }
            status if status.is_success() => response
                .json::<UserRecord>()
                .await
                .map(|user| Some(user.into()))
                .map_err(|err| BackendError::Parse(format!("failed to decode user: {err}"))),
            _ => Err(http_error(response).await),
        }
    }

    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        Ok(self
            .tokens
            .load()?
            .filter(|session| !session.is_expired())
            .map(|session| session.session()))
    }

    #[instrument(skip(self))]
    async fn get_profile_by_id(
        &self,
        id: &str,
        exclude_deleted: bool,
    ) -> Result<Option<Profile>, BackendError> {
        let token = self.access_token()?;

        let mut url = self.endpoint(PROFILES_PATH)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("select", "*");
            query.append_pair("id", &format!("eq.{id}"));
            if exclude_deleted {
                query.append_pair("deleted_at", "is.null");
            }
        }

        let response = self
            .send(self.authorized(self.client.get(url), token.as_deref()))
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::NOT_ACCEPTABLE => Err(BackendError::NotFound),
            status if status.is_success() => {
                let rows: Vec<Profile> = response
                    .json()
                    .await
                    .map_err(|err| BackendError::Parse(format!("failed to decode profile: {err}")))?;
                Ok(rows.into_iter().next())
            }
            _ => Err(http_error(response).await),
        }
    }

    /// Forgets the local session first, then asks the backend to revoke it.
    /// The local record is gone even when revocation fails.
    #[instrument(skip(self))]
    async fn sign_out(&self) -> Result<(), BackendError> {
        let token = self.tokens.load().ok().flatten().map(|session| session.access_token);
        let cleared = self.tokens.clear();
        self.listeners.emit(AuthChangeEvent::SignedOut);

        if let Some(token) = token {
            let url = self.endpoint(LOGOUT_PATH)?;
            let response = self
                .send(self.authorized(self.client.post(url), Some(token.as_str())))
                .await?;

            match response.status() {
                // Already revoked or expired on the backend side.
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {}
                status if status.is_success() => {}
                _ => return Err(http_error(response).await),
            }
        }

        cleared
    }
}

impl ClientConnection for HttpBackend {
    fn on_auth_change(&self, listener: AuthChangeListener) -> ListenerId {
        self.listeners.add(listener)
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.remove(id);
    }
}

/// Builds browser-runtime connections that persist their session in `store`.
pub struct HttpConnector {
    config: BackendConfig,
    store: Arc<dyn KeyValueStore>,
}

impl HttpConnector {
    #[must_use]
    pub fn new(config: BackendConfig, store: Arc<dyn KeyValueStore>) -> Self {
        Self { config, store }
    }
}

impl ClientConnector for HttpConnector {
    fn connect(&self) -> Result<Arc<dyn ClientConnection>, HandleError> {
        let client = self.config.build_client()?;
        Ok(Arc::new(HttpBackend::new(
            client,
            self.config.clone(),
            TokenSource::store(Arc::clone(&self.store), SESSION_TOKEN_KEY),
        )))
    }
}

/// Surfaces HTTP errors with sanitized bodies.
async fn http_error(response: Response) -> BackendError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    BackendError::Http {
        status,
        message: sanitize_body(&body),
    }
}

fn sanitize_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "request failed".to_string()
    } else {
        trimmed.chars().take(MAX_ERROR_CHARS).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{state::unix_seconds_now, store::MemoryStore};
    use axum::{
        extract::{Query, State},
        http::{HeaderMap, StatusCode as AxumStatus},
        response::IntoResponse,
        routing::{get, post},
        Json, Router,
    };
    use parking_lot::Mutex;
    use secrecy::SecretString;
    use serde_json::json;
    use std::{
        collections::HashMap,
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };
    use tokio::net::TcpListener;

    #[derive(Clone, Default)]
    struct Fake {
        logouts: Arc<AtomicUsize>,
        profile_queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
    }

    fn bearer(headers: &HeaderMap) -> Option<String> {
        headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::to_string)
    }

    async fn user(headers: HeaderMap) -> impl IntoResponse {
        match bearer(&headers).as_deref() {
            Some("good") => (
                AxumStatus::OK,
                Json(json!({
                    "id": "u1",
                    "email": "ada@concord.dev",
                    "email_confirmed_at": "2024-01-01T00:00:00Z"
                })),
            )
                .into_response(),
            Some("unverified") => (
                AxumStatus::OK,
                Json(json!({"id": "u2", "email": "bob@concord.dev", "email_confirmed_at": null})),
            )
                .into_response(),
            Some("broken") => (AxumStatus::INTERNAL_SERVER_ERROR, "x".repeat(500)).into_response(),
            _ => AxumStatus::UNAUTHORIZED.into_response(),
        }
    }

    async fn profiles(
        State(fake): State<Fake>,
        Query(query): Query<HashMap<String, String>>,
    ) -> impl IntoResponse {
        fake.profile_queries.lock().push(query.clone());
        match query.get("id").map(String::as_str) {
            Some("eq.u1") => Json(json!([{"id": "u1", "username": "ada", "deleted_at": null}]))
                .into_response(),
            Some("eq.gone") => AxumStatus::NOT_ACCEPTABLE.into_response(),
            _ => Json(json!([])).into_response(),
        }
    }

    async fn logout(State(fake): State<Fake>) -> impl IntoResponse {
        fake.logouts.fetch_add(1, Ordering::SeqCst);
        AxumStatus::NO_CONTENT
    }

    async fn slow_user() -> impl IntoResponse {
        tokio::time::sleep(Duration::from_secs(5)).await;
        AxumStatus::UNAUTHORIZED
    }

    async fn spawn(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await });
        format!("http://{addr}")
    }

    async fn spawn_fake() -> (String, Fake) {
        let fake = Fake::default();
        let router = Router::new()
            .route("/auth/v1/user", get(user))
            .route("/auth/v1/logout", post(logout))
            .route("/rest/v1/profiles", get(profiles))
            .with_state(fake.clone());
        (spawn(router).await, fake)
    }

    fn backend(base: &str, token: Option<&str>) -> (HttpBackend, Arc<MemoryStore>) {
        let config = BackendConfig::new(base, SecretString::from("anon".to_string()))
            .unwrap()
            .with_request_timeout(Duration::from_millis(500));
        let store = Arc::new(MemoryStore::new());
        let tokens = TokenSource::store(store.clone(), SESSION_TOKEN_KEY);
        if let Some(token) = token {
            tokens
                .save(&StoredSession {
                    access_token: token.to_string(),
                    refresh_token: None,
                    user_id: "u1".to_string(),
                    expires_at: Some(unix_seconds_now() + 3600),
                    issued_at: None,
                })
                .unwrap();
        }
        let client = config.build_client().unwrap();
        (HttpBackend::new(client, config, tokens), store)
    }

    #[tokio::test]
    async fn resolves_identity_and_session_from_stored_token() {
        let (base, _) = spawn_fake().await;
        let (backend, _) = backend(&base, Some("good"));

        let identity = backend.get_identity().await.unwrap().unwrap();
        assert_eq!(identity.id, "u1");
        assert!(identity.email_verified);

        let session = backend.get_session().await.unwrap().unwrap();
        assert_eq!(session.user_id, "u1");
    }

    #[tokio::test]
    async fn unconfirmed_email_is_unverified() {
        let (base, _) = spawn_fake().await;
        let (backend, _) = backend(&base, Some("unverified"));
        let identity = backend.get_identity().await.unwrap().unwrap();
        assert!(!identity.email_verified);
    }

    #[tokio::test]
    async fn missing_or_rejected_token_means_nobody() {
        let (base, _) = spawn_fake().await;

        let (anonymous, _) = backend(&base, None);
        assert_eq!(anonymous.get_identity().await, Ok(None));
        assert_eq!(anonymous.get_session().await, Ok(None));

        let (rejected, _) = backend(&base, Some("revoked"));
        assert_eq!(rejected.get_identity().await, Ok(None));
    }

    #[tokio::test]
    async fn expired_record_is_not_a_session() {
        let (base, _) = spawn_fake().await;
        let (backend, _) = backend(&base, None);
        backend
            .tokens()
            .save(&StoredSession {
                access_token: "good".to_string(),
                refresh_token: None,
                user_id: "u1".to_string(),
                expires_at: Some(unix_seconds_now() - 10),
                issued_at: None,
            })
            .unwrap();

        assert_eq!(backend.get_session().await, Ok(None));
        assert_eq!(backend.get_identity().await, Ok(None));
    }

    #[tokio::test]
    async fn server_errors_carry_truncated_body() {
        let (base, _) = spawn_fake().await;
        let (backend, _) = backend(&base, Some("broken"));

        match backend.get_identity().await {
            Err(BackendError::Http { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message.len(), MAX_ERROR_CHARS);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn profile_query_filters_soft_deleted_rows() {
        let (base, fake) = spawn_fake().await;
        let (backend, _) = backend(&base, Some("good"));

        let profile = backend.get_profile_by_id("u1", true).await.unwrap().unwrap();
        assert_eq!(profile.username.as_deref(), Some("ada"));
        assert_eq!(backend.get_profile_by_id("u9", false).await, Ok(None));
        assert_eq!(
            backend.get_profile_by_id("gone", true).await,
            Err(BackendError::NotFound)
        );

        let queries = fake.profile_queries.lock().clone();
        assert_eq!(queries[0].get("deleted_at").map(String::as_str), Some("is.null"));
        assert_eq!(queries[0].get("select").map(String::as_str), Some("*"));
        assert_eq!(queries[1].get("deleted_at"), None);
    }

    #[tokio::test]
    async fn sign_out_clears_token_revokes_and_notifies() {
        let (base, fake) = spawn_fake().await;
        let (backend, store) = backend(&base, Some("good"));
        let events = Arc::new(Mutex::new(Vec::new()));
        backend.on_auth_change(Arc::new({
            let events = Arc::clone(&events);
            move |event: AuthChangeEvent| events.lock().push(event)
        }));

        backend.sign_out().await.unwrap();

        assert!(!store.contains(SESSION_TOKEN_KEY));
        assert_eq!(fake.logouts.load(Ordering::SeqCst), 1);
        assert_eq!(*events.lock(), vec![AuthChangeEvent::SignedOut]);
        assert_eq!(backend.get_identity().await, Ok(None));
    }

    #[tokio::test]
    async fn sign_out_against_unreachable_backend_still_forgets_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (backend, store) = backend(&format!("http://{addr}"), Some("good"));
        let result = backend.sign_out().await;

        assert!(matches!(
            result,
            Err(BackendError::Network(_) | BackendError::Timeout(_))
        ));
        assert!(!store.contains(SESSION_TOKEN_KEY));
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let base = spawn(Router::new().route("/auth/v1/user", get(slow_user))).await;
        let (backend, _) = backend(&base, Some("good"));
        assert_eq!(backend.get_identity().await, Err(BackendError::Timeout(500)));
    }

    #[tokio::test]
    async fn store_session_distinguishes_sign_in_from_refresh() {
        let (base, _) = spawn_fake().await;
        let (backend, _) = backend(&base, None);
        let events = Arc::new(Mutex::new(Vec::new()));
        backend.on_auth_change(Arc::new({
            let events = Arc::clone(&events);
            move |event: AuthChangeEvent| events.lock().push(event)
        }));

        let record = StoredSession {
            access_token: "good".to_string(),
            refresh_token: Some("r1".to_string()),
            user_id: "u1".to_string(),
            expires_at: None,
            issued_at: None,
        };
        backend.store_session(&record).unwrap();
        backend.store_session(&record).unwrap();

        assert_eq!(
            *events.lock(),
            vec![AuthChangeEvent::SignedIn, AuthChangeEvent::TokenRefreshed]
        );
    }

    #[test]
    fn connector_builds_store_backed_connections() {
        let config =
            BackendConfig::new("http://127.0.0.1:1", SecretString::from("anon".to_string())).unwrap();
        let connector = HttpConnector::new(config, Arc::new(MemoryStore::new()));
        assert!(connector.connect().is_ok());
    }

    #[test]
    fn blank_error_body_gets_placeholder() {
        assert_eq!(sanitize_body("   "), "request failed");
        assert_eq!(sanitize_body(" boom "), "boom");
    }
}
