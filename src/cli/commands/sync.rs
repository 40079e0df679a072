use crate::sync::SyncConfig;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::time::Duration;

pub const ARG_REQUEST_TIMEOUT_MS: &str = "request-timeout-ms";
pub const ARG_SESSION_COOKIE: &str = "session-cookie";
pub const ARG_INSECURE_COOKIES: &str = "insecure-cookies";

#[derive(Debug, Clone)]
pub struct Options {
    pub config: SyncConfig,
    pub secure_cookies: bool,
}

impl Options {
    /// Parse the server-flavor settings from matches. Handle staleness and the
    /// client reader deadlines only apply inside a browser runtime and stay at
    /// their `SyncConfig` defaults here.
    ///
    /// # Errors
    /// Returns an error if the session cookie name is blank.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let mut config = SyncConfig::new();

        if let Some(millis) = matches.get_one::<u64>(ARG_REQUEST_TIMEOUT_MS) {
            config = config.with_request_timeout(Duration::from_millis(*millis));
        }
        if let Some(name) = matches.get_one::<String>(ARG_SESSION_COOKIE) {
            let name = name.trim();
            if name.is_empty() {
                anyhow::bail!("--{ARG_SESSION_COOKIE} must not be empty");
            }
            config = config.with_session_cookie_name(name.to_string());
        }

        Ok(Self {
            config,
            secure_cookies: !matches.get_flag(ARG_INSECURE_COOKIES),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_REQUEST_TIMEOUT_MS)
                .long(ARG_REQUEST_TIMEOUT_MS)
                .help("Per-request timeout for backend calls in milliseconds")
                .env("CONCORD_REQUEST_TIMEOUT_MS")
                .default_value("10000")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_SESSION_COOKIE)
                .long(ARG_SESSION_COOKIE)
                .help("Name of the cookie holding the session record")
                .env("CONCORD_SESSION_COOKIE")
                .default_value("concord-auth-token"),
        )
        .arg(
            Arg::new(ARG_INSECURE_COOKIES)
                .long(ARG_INSECURE_COOKIES)
                .help("Omit the Secure attribute on session cookies (plain-http development only)")
                .env("CONCORD_INSECURE_COOKIES")
                .action(ArgAction::SetTrue),
        )
}
