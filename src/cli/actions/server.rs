use crate::{
    api::{self, ApiState},
    backend::BackendConfig,
    cli::telemetry,
    sync::{SyncConfig, TracingObserver},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub backend_url: String,
    pub backend_anon_key: SecretString,
    pub sync: SyncConfig,
    pub secure_cookies: bool,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the backend configuration is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let backend = BackendConfig::new(&args.backend_url, args.backend_anon_key)
        .context("invalid backend configuration")?
        .with_request_timeout(args.sync.request_timeout());

    let state = ApiState::new(backend, &args.sync, Arc::new(TracingObserver))
        .context("failed to initialize API state")?
        .with_secure_cookies(args.secure_cookies);

    let result = api::new(args.port, state).await;

    telemetry::shutdown_tracer();

    result
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("backend_url", args.backend_url.clone()),
        (
            "request_timeout",
            format!("{}ms", args.sync.request_timeout().as_millis()),
        ),
        ("session_cookie", args.sync.session_cookie_name().to_string()),
        ("secure_cookies", args.secure_cookies.to_string()),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "concord {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_commit_truncates() {
        assert_eq!(short_commit("0123456789abcdef"), "0123456");
        assert_eq!(short_commit("abc"), "abc");
        assert_eq!(short_commit(" unknown "), "unknown");
    }

    #[tokio::test]
    async fn invalid_backend_url_fails_before_binding() {
        let args = Args {
            port: 0,
            backend_url: "ftp://db.concord.dev".to_string(),
            backend_anon_key: SecretString::from("anon".to_string()),
            sync: SyncConfig::new(),
            secure_cookies: true,
        };
        let err = execute(args).await.unwrap_err();
        assert!(err.to_string().contains("invalid backend configuration"));
    }
}
