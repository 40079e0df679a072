//! Server-flavor auth endpoints.
//!
//! The session comes from the request's cookies; any cookie rewrite made while
//! answering (a sign-out expiring the session cookie) is sent back as
//! `Set-Cookie`.

use crate::{
    api::ApiState,
    sync::{
        report_drift, AuthBackend, AuthEvent, AuthState, ConsistencyReport, RequestCookies,
    },
};
use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

#[utoipa::path(
    get,
    path = "/v1/auth/state",
    responses(
        (status = 200, description = "Who the request's cookies say is logged in", body = AuthState)
    ),
    tag = "auth"
)]
pub async fn state(headers: HeaderMap, api: Extension<Arc<ApiState>>) -> impl IntoResponse {
    let jar = Arc::new(RequestCookies::from_headers(&headers));
    let connection = api.connection(Arc::clone(&jar));

    let auth_state = api.reader().read(&connection).await;

    (StatusCode::OK, response_cookies(&jar), Json(auth_state))
}

#[utoipa::path(
    post,
    path = "/v1/auth/drift",
    request_body = AuthState,
    responses(
        (status = 200, description = "Comparison of the submitted client state with the server state", body = ConsistencyReport)
    ),
    tag = "auth"
)]
pub async fn drift(
    headers: HeaderMap,
    api: Extension<Arc<ApiState>>,
    Json(client): Json<AuthState>,
) -> impl IntoResponse {
    let jar = Arc::new(RequestCookies::from_headers(&headers));
    let connection = api.connection(Arc::clone(&jar));

    let server = api.reader().read(&connection).await;
    let report = report_drift(&server, &client, api.observer());

    (StatusCode::OK, response_cookies(&jar), Json(report))
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cookie expired; backend revocation is best-effort")
    ),
    tag = "auth"
)]
pub async fn logout(headers: HeaderMap, api: Extension<Arc<ApiState>>) -> impl IntoResponse {
    let jar = Arc::new(RequestCookies::from_headers(&headers));
    let connection = api.connection(Arc::clone(&jar));

    if let Err(err) = connection.sign_out().await {
        api.observer().record(AuthEvent::SignOutFailed {
            reason: err.to_string(),
        });
    }

    (StatusCode::NO_CONTENT, response_cookies(&jar))
}

fn response_cookies(jar: &RequestCookies) -> HeaderMap {
    let mut headers = HeaderMap::new();
    jar.write_to(&mut headers);
    headers
}
