//! `-v` / `TESSERA_LOG_LEVEL`.
//!
//! Each `-v` raises the level by one step from ERROR. The env var takes either
//! a level name or the equivalent count, so `TESSERA_LOG_LEVEL=debug` and
//! `-vvv` both select DEBUG.

use clap::{builder::ValueParser, Arg, Command};

pub const ARG_VERBOSITY: &str = "verbosity";

/// Level names in verbosity-count order.
const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Highest count accepted from the env var; anything above 4 is TRACE anyway.
const MAX_COUNT: u8 = 5;

fn parse_log_level(level: &str) -> Result<u8, String> {
    let level = level.trim();
    if let Ok(count) = level.parse::<u8>() {
        return if count <= MAX_COUNT {
            Ok(count)
        } else {
            Err(format!("log level count must be at most {MAX_COUNT}"))
        };
    }

    let lowered = level.to_lowercase();
    LEVELS
        .iter()
        .zip(0u8..)
        .find_map(|(name, count)| (*name == lowered).then_some(count))
        .ok_or_else(|| format!("invalid log level {level:?}, expected one of {LEVELS:?}"))
}

#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(parse_log_level)
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
            .env("TESSERA_LOG_LEVEL")
            .global(true)
            .action(clap::ArgAction::Count)
            .value_parser(validator_log_level()),
    )
}
