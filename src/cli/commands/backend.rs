use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_BACKEND_URL: &str = "backend-url";
pub const ARG_BACKEND_ANON_KEY: &str = "backend-anon-key";

#[derive(Debug, Clone)]
pub struct Options {
    pub url: String,
    pub anon_key: SecretString,
}

impl Options {
    /// Parse backend arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the URL or anon key is missing or blank.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let url = match matches.get_one::<String>(ARG_BACKEND_URL) {
            Some(value) if !value.trim().is_empty() => value.clone(),
            _ => anyhow::bail!("missing required argument: --{ARG_BACKEND_URL}"),
        };

        let anon_key = match matches.get_one::<String>(ARG_BACKEND_ANON_KEY) {
            Some(value) if !value.trim().is_empty() => SecretString::from(value.clone()),
            _ => anyhow::bail!("missing required argument: --{ARG_BACKEND_ANON_KEY}"),
        };

        Ok(Self { url, anon_key })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_BACKEND_URL)
                .long(ARG_BACKEND_URL)
                .help("Base URL of the managed auth/content backend")
                .env("CONCORD_BACKEND_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_BACKEND_ANON_KEY)
                .long(ARG_BACKEND_ANON_KEY)
                .help("Public (anon) API key sent with every backend request")
                .env("CONCORD_BACKEND_ANON_KEY")
                .hide_env_values(true)
                .required(true),
        )
}
