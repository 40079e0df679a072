use crate::api::handlers::{auth, health};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Endpoints registered with `.routes(routes!(...))` are both served and
/// documented.
pub(crate) fn api_router() -> OpenApiRouter {
    OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(auth::state))
        .routes(routes!(auth::drift))
        .routes(routes!(auth::logout))
}

fn tags() -> Vec<Tag> {
    let mut health_tag = Tag::new("health");
    health_tag.description = Some("Build and liveness information".to_string());
    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Server-side auth state and drift diagnostics".to_string());
    vec![health_tag, auth_tag]
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    OpenApiBuilder::new().info(info).tags(Some(tags())).build()
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    match author.find('<') {
        Some(start) => {
            let name = author[..start].trim();
            let email = author[start + 1..].trim().trim_end_matches('>').trim();
            (non_empty(name), non_empty(email))
        }
        None => (non_empty(author.trim()), None),
    }
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_route() {
        let document = openapi();
        let paths: Vec<&String> = document.paths.paths.keys().collect();
        for expected in ["/health", "/v1/auth/state", "/v1/auth/drift", "/v1/auth/logout"] {
            assert!(
                paths.iter().any(|path| path.as_str() == expected),
                "missing {expected} in {paths:?}"
            );
        }
        assert_eq!(document.info.title, env!("CARGO_PKG_NAME"));
        let tags: Vec<String> = document
            .tags
            .unwrap_or_default()
            .into_iter()
            .map(|tag| tag.name)
            .collect();
        assert_eq!(tags, vec!["health".to_string(), "auth".to_string()]);
    }

    #[test]
    fn parses_cargo_authors() {
        assert_eq!(
            parse_author("Team Concord <team@concord.community>"),
            (Some("Team Concord"), Some("team@concord.community"))
        );
        assert_eq!(parse_author("solo"), (Some("solo"), None));
        assert_eq!(parse_author(" <> "), (None, None));
    }
}
