use super::*;
use crate::{
    backend::StoredSession,
    sync::{
        cookies::encode_cookie_value, state::unix_seconds_now, AuthEvent, ConsistencyReport,
        RecordingObserver,
    },
};
use anyhow::Result;
use axum::{
    body::to_bytes,
    http::{
        header::{CONTENT_TYPE, COOKIE, SET_COOKIE},
        HeaderMap, StatusCode,
    },
    response::IntoResponse,
    routing::{get, post},
    Json,
};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use tower::ServiceExt;

const COOKIE_NAME: &str = "concord-auth-token";

async fn user(headers: HeaderMap) -> impl IntoResponse {
    let authorized = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        == Some("Bearer good");
    if authorized {
        Json(json!({
            "id": "u1",
            "email": "ada@concord.dev",
            "email_confirmed_at": "2024-01-01T00:00:00Z"
        }))
        .into_response()
    } else {
        StatusCode::UNAUTHORIZED.into_response()
    }
}

async fn profiles() -> impl IntoResponse {
    Json(json!([{"id": "u1", "username": "ada"}]))
}

async fn spawn_backend(logouts: Arc<AtomicUsize>) -> Result<String> {
    let router = Router::new()
        .route("/auth/v1/user", get(user))
        .route("/rest/v1/profiles", get(profiles))
        .route(
            "/auth/v1/logout",
            post(move || {
                let logouts = Arc::clone(&logouts);
                async move {
                    logouts.fetch_add(1, Ordering::SeqCst);
                    StatusCode::NO_CONTENT
                }
            }),
        );
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move { axum::serve(listener, router).await });
    Ok(format!("http://{addr}"))
}

/// A base URL nothing listens on.
async fn dead_backend() -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("http://{addr}"))
}

fn app(base: &str, observer: Arc<RecordingObserver>) -> Result<Router> {
    let backend = BackendConfig::new(base, SecretString::from("anon".to_string()))?;
    let state = ApiState::new(backend, &SyncConfig::new(), observer)?.with_secure_cookies(false);
    Ok(router(Arc::new(state)))
}

fn session_cookie(token: &str) -> Result<String> {
    let record = StoredSession {
        access_token: token.to_string(),
        refresh_token: None,
        user_id: "u1".to_string(),
        expires_at: Some(unix_seconds_now() + 3600),
        issued_at: None,
    };
    Ok(format!(
        "{COOKIE_NAME}={}",
        encode_cookie_value(&serde_json::to_string(&record)?)
    ))
}

async fn json_body(response: axum::response::Response) -> Result<Value> {
    let body = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&body)?)
}

#[tokio::test]
async fn health_reports_build_info_and_request_id() -> Result<()> {
    let app = app(&dead_backend().await?, Arc::new(RecordingObserver::new()))?;

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty())?)
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert!(response.headers().contains_key("X-App"));
    let body = json_body(response).await?;
    assert_eq!(body["name"], env!("CARGO_PKG_NAME"));
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    Ok(())
}

#[tokio::test]
async fn state_without_cookie_is_signed_out() -> Result<()> {
    let observer = Arc::new(RecordingObserver::new());
    let app = app(&dead_backend().await?, observer.clone())?;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/auth/state")
                .body(Body::empty())?,
        )
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert_eq!(body["is_authenticated"], false);
    assert_eq!(body["identity"], Value::Null);
    assert!(observer.events().is_empty());
    Ok(())
}

#[tokio::test]
async fn state_resolves_identity_and_profile_from_cookie() -> Result<()> {
    let base = spawn_backend(Arc::new(AtomicUsize::new(0))).await?;
    let app = app(&base, Arc::new(RecordingObserver::new()))?;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/auth/state")
                .header(COOKIE, session_cookie("good")?)
                .body(Body::empty())?,
        )
        .await?;

    let body = json_body(response).await?;
    assert_eq!(body["is_authenticated"], true);
    assert_eq!(body["is_email_verified"], true);
    assert_eq!(body["identity"]["id"], "u1");
    assert_eq!(body["profile"]["username"], "ada");
    Ok(())
}

#[tokio::test]
async fn drift_reports_signed_out_client() -> Result<()> {
    let base = spawn_backend(Arc::new(AtomicUsize::new(0))).await?;
    let observer = Arc::new(RecordingObserver::new());
    let app = app(&base, observer.clone())?;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/auth/drift")
                .header(COOKIE, session_cookie("good")?)
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))?,
        )
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let report: ConsistencyReport = serde_json::from_value(json_body(response).await?)?;
    assert!(!report.is_consistent);
    assert_eq!(report.issues.len(), 4);
    assert!(report.issues[0].starts_with("identity mismatch"));
    assert_eq!(
        observer.count(|event| matches!(event, AuthEvent::DriftDetected { .. })),
        1
    );
    Ok(())
}

#[tokio::test]
async fn logout_expires_cookie_and_revokes() -> Result<()> {
    let logouts = Arc::new(AtomicUsize::new(0));
    let base = spawn_backend(Arc::clone(&logouts)).await?;
    let app = app(&base, Arc::new(RecordingObserver::new()))?;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/auth/logout")
                .header(COOKIE, session_cookie("good")?)
                .body(Body::empty())?,
        )
        .await?;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let cookie = response
        .headers()
        .get(SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    assert!(cookie.starts_with(&format!("{COOKIE_NAME}=; Path=/")));
    assert!(cookie.contains("Max-Age=0"));
    assert!(!cookie.contains("Secure"));
    assert_eq!(logouts.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn logout_succeeds_when_backend_is_down() -> Result<()> {
    let observer = Arc::new(RecordingObserver::new());
    let app = app(&dead_backend().await?, observer.clone())?;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/auth/logout")
                .header(COOKIE, session_cookie("good")?)
                .body(Body::empty())?,
        )
        .await?;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(response.headers().contains_key(SET_COOKIE));
    assert_eq!(
        observer.count(|event| matches!(event, AuthEvent::SignOutFailed { .. })),
        1
    );
    Ok(())
}
