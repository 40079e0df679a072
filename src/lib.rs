//! # Concord
//!
//! Keeps the answer to "who is logged in" consistent between a stateless server
//! context, which recovers the session from request cookies, and a long-lived
//! browser runtime, which holds a cached client connection to the managed
//! auth/content backend.
//!
//! The core lives in [`sync`]: the state readers, the session handle cache, the
//! consistency validator and the logout coordinator. [`backend`] provides the
//! HTTP adapter for the backend, [`api`] a small diagnostics server for the
//! server flavor, and [`cli`] the `concord` binary's entry point.
//!
//! ## Failure policy
//!
//! Reads never fail: an unreachable backend or a timed-out lookup produces the
//! empty (signed-out) state, and a missing or failed profile lookup keeps the
//! user authenticated without a profile. Sign-out always completes its local
//! cleanup even when the backend cannot be reached.

pub mod api;
pub mod backend;
pub mod cli;
pub mod sync;

pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
