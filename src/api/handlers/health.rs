use crate::GIT_COMMIT_HASH;
use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
}

#[utoipa::path(
    get,
    path= "/health",
    responses (
        (status = 200, description = "Service is up", body = Health)
    ),
    tag = "health",
)]
/// Report build information. Does not contact the backend.
pub async fn health() -> impl IntoResponse {
    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    let short_hash = if health.commit.len() > 7 {
        &health.commit[0..7]
    } else {
        ""
    };

    let mut headers = HeaderMap::new();
    match format!("{}:{}:{}", health.name, health.version, short_hash).parse::<HeaderValue>() {
        Ok(value) => {
            headers.insert("X-App", value);
        }
        Err(err) => debug!("Failed to parse X-App header: {}", err),
    }

    (StatusCode::OK, headers, Json(health))
}
