use clap::{builder::ValueParser, Arg, ArgAction, Command};

pub const ARG_VERBOSITY: &str = "verbosity";

/// Level names in verbosity-count order.
const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Accepts a level name (any case) or its count, `0` (error) to `4` (trace).
fn parse_verbosity(value: &str) -> Result<u8, String> {
    let value = value.trim();
    let index = match value.parse::<usize>() {
        Ok(count) => Some(count).filter(|count| *count < LEVELS.len()),
        Err(_) => LEVELS
            .iter()
            .position(|level| level.eq_ignore_ascii_case(value)),
    };

    index
        .and_then(|index| u8::try_from(index).ok())
        .ok_or_else(|| {
            format!(
                "invalid log level {value:?}, expected one of: {}",
                LEVELS.join(", ")
            )
        })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
            .env("CONCORD_LOG_LEVEL")
            .global(true)
            .action(ArgAction::Count)
            .value_parser(ValueParser::from(parse_verbosity)),
    )
}
