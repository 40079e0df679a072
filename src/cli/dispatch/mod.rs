//! Maps validated CLI arguments to an action.

use crate::cli::{
    actions::{server::Args, Action},
    commands::{backend, sync, ARG_PORT},
};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);

    let backend_opts = backend::Options::parse(matches)?;
    let sync_opts = sync::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        backend_url: backend_opts.url,
        backend_anon_key: backend_opts.anon_key,
        sync: sync_opts.config,
        secure_cookies: sync_opts.secure_cookies,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;

    #[test]
    fn builds_server_action() {
        temp_env::with_vars_unset(
            ["CONCORD_PORT", "CONCORD_SESSION_COOKIE", "CONCORD_INSECURE_COOKIES"],
            || {
                let matches = commands::new().get_matches_from(vec![
                    "concord",
                    "--backend-url",
                    "https://db.concord.dev",
                    "--backend-anon-key",
                    "anon",
                ]);

                let Ok(Action::Server(args)) = handler(&matches) else {
                    panic!("expected a server action");
                };
                assert_eq!(args.port, 8080);
                assert_eq!(args.backend_url, "https://db.concord.dev");
                assert_eq!(args.sync.session_cookie_name(), "concord-auth-token");
                assert!(args.secure_cookies);
            },
        );
    }

    #[test]
    fn blank_backend_url_is_rejected() {
        temp_env::with_vars_unset(["CONCORD_BACKEND_URL"], || {
            let matches = commands::new().get_matches_from(vec![
                "concord",
                "--backend-url",
                " ",
                "--backend-anon-key",
                "anon",
            ]);
            assert!(handler(&matches).is_err());
        });
    }
}
