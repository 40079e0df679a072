//! Drift detection between server- and client-computed states.

use super::{
    observer::{AuthEvent, AuthObserver},
    state::AuthState,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ConsistencyReport {
    pub is_consistent: bool,
    /// Human-readable mismatches in a fixed order: identity, authentication,
    /// email verification, profile.
    pub issues: Vec<String>,
}

/// Compares two states for the same request lifecycle. Pure; never fails.
///
/// Absent ids only ever equal other absent ids.
#[must_use]
pub fn validate(server: &AuthState, client: &AuthState) -> ConsistencyReport {
    let mut issues = Vec::new();

    if server.identity_id() != client.identity_id() {
        issues.push(format!(
            "identity mismatch: server={} client={}",
            describe(server.identity_id()),
            describe(client.identity_id())
        ));
    }

    if server.is_authenticated() != client.is_authenticated() {
        issues.push(format!(
            "authentication mismatch: server={} client={}",
            server.is_authenticated(),
            client.is_authenticated()
        ));
    }

    if server.is_email_verified() != client.is_email_verified() {
        issues.push(format!(
            "email verification mismatch: server={} client={}",
            server.is_email_verified(),
            client.is_email_verified()
        ));
    }

    if server.profile_id() != client.profile_id() {
        issues.push(format!(
            "profile mismatch: server={} client={}",
            describe(server.profile_id()),
            describe(client.profile_id())
        ));
    }

    ConsistencyReport {
        is_consistent: issues.is_empty(),
        issues,
    }
}

/// Validates and records `DriftDetected` when the states disagree.
pub fn report_drift(
    server: &AuthState,
    client: &AuthState,
    observer: &dyn AuthObserver,
) -> ConsistencyReport {
    let report = validate(server, client);
    if !report.is_consistent {
        observer.record(AuthEvent::DriftDetected {
            issues: report.issues.clone(),
        });
    }
    report
}

/// Validates, reports any drift, and returns the state the UI should use. The
/// client state wins; the server state only serves diagnostics.
#[must_use]
pub fn reconcile(server: &AuthState, client: AuthState, observer: &dyn AuthObserver) -> AuthState {
    report_drift(server, &client, observer);
    client
}

fn describe(id: Option<&str>) -> String {
    id.map_or_else(|| "absent".to_string(), |id| format!("{id:?}"))
}
