//! Diagnostics HTTP surface for the server flavor.
//!
//! Every request gets its own backend connection bound to the request's
//! cookies, so nothing auth-related is shared between requests.

use crate::{
    backend::{BackendConfig, HttpBackend, TokenSource},
    sync::{
        AuthObserver, CookieOptions, HandleError, RequestCookies, StateReader, SyncConfig,
    },
};
use anyhow::Result;
use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    Extension, Router,
};
use reqwest::Client;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{debug_span, info, Span};
use ulid::Ulid;

mod handlers;
pub mod openapi;

/// Shared state for the diagnostics handlers.
pub struct ApiState {
    client: Client,
    backend: BackendConfig,
    cookie_name: String,
    secure_cookies: bool,
    reader: StateReader,
    observer: Arc<dyn AuthObserver>,
}

impl ApiState {
    /// # Errors
    /// Returns `HandleError::Init` if the HTTP client cannot be built.
    pub fn new(
        backend: BackendConfig,
        sync: &SyncConfig,
        observer: Arc<dyn AuthObserver>,
    ) -> Result<Self, HandleError> {
        Ok(Self {
            client: backend.build_client()?,
            backend,
            cookie_name: sync.session_cookie_name().to_string(),
            secure_cookies: true,
            reader: StateReader::server(Arc::clone(&observer)),
            observer,
        })
    }

    /// Drops the `Secure` attribute from session cookies, for plain-http
    /// local setups.
    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// A backend connection whose session lives in `jar`.
    pub(crate) fn connection(&self, jar: Arc<RequestCookies>) -> HttpBackend {
        HttpBackend::new(
            self.client.clone(),
            self.backend.clone(),
            TokenSource::cookies(
                jar,
                &self.cookie_name,
                CookieOptions::session(self.secure_cookies),
            ),
        )
    }

    pub(crate) fn reader(&self) -> &StateReader {
        &self.reader
    }

    pub(crate) fn observer(&self) -> &dyn AuthObserver {
        self.observer.as_ref()
    }
}

impl std::fmt::Debug for ApiState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiState")
            .field("backend", &self.backend.base_url().as_str())
            .field("cookie_name", &self.cookie_name)
            .field("secure_cookies", &self.secure_cookies)
            .finish_non_exhaustive()
    }
}

/// Builds the application router with request-id and trace layers.
#[must_use]
pub fn router(state: Arc<ApiState>) -> Router {
    let (router, _openapi) = openapi::api_router().split_for_parts();
    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(Extension(state)),
    )
}

/// Serves the diagnostics API until ctrl-c.
///
/// # Errors
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn new(port: u16, state: ApiState) -> Result<()> {
    let app = router(Arc::new(state));

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

// span
fn make_span(request: &Request<Body>) -> Span {
    let headers = request.headers();
    let path = request.uri().path();
    let request_id = headers
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!("http-request", path, request_id)
}

#[cfg(test)]
mod tests;
