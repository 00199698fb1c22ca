use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};

use crate::strategy::StrategyKind;

pub const ARG_STRATEGIES: &str = "strategies";
pub const ARG_BCRYPT_COST: &str = "bcrypt-cost";
pub const ARG_VERIFICATION_TTL: &str = "verification-ttl-seconds";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_EMAIL_FROM: &str = "email-from";
pub const ARG_REQUEST_TIMEOUT: &str = "request-timeout-seconds";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_STRATEGIES)
                .long(ARG_STRATEGIES)
                .help("Comma separated strategies to enable: credentials, personal_number, noop")
                .env("TESSERA_STRATEGIES")
                .default_value("credentials,personal_number"),
        )
        .arg(
            Arg::new(ARG_BCRYPT_COST)
                .long(ARG_BCRYPT_COST)
                .help("bcrypt work factor for password hashes")
                .env("TESSERA_BCRYPT_COST")
                .default_value("12")
                .value_parser(clap::value_parser!(u32).range(4..=31)),
        )
        .arg(
            Arg::new(ARG_VERIFICATION_TTL)
                .long(ARG_VERIFICATION_TTL)
                .help("Email verification token TTL in seconds")
                .env("TESSERA_VERIFICATION_TTL_SECONDS")
                .default_value("1800")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL used for verification links and CORS")
                .env("TESSERA_FRONTEND_BASE_URL")
                .default_value("http://localhost:8080/"),
        )
        .arg(
            Arg::new(ARG_EMAIL_FROM)
                .long(ARG_EMAIL_FROM)
                .help("Sender address for verification emails")
                .env("TESSERA_EMAIL_FROM")
                .default_value("no-reply@tessera.local"),
        )
        .arg(
            Arg::new(ARG_REQUEST_TIMEOUT)
                .long(ARG_REQUEST_TIMEOUT)
                .help("Deadline for a single engine operation in seconds")
                .env("TESSERA_REQUEST_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub strategies: Vec<StrategyKind>,
    pub bcrypt_cost: u32,
    pub verification_ttl_seconds: i64,
    pub frontend_base_url: String,
    pub email_from: String,
    pub request_timeout_seconds: u64,
}

impl Options {
    /// # Errors
    ///
    /// Returns an error if a strategy name is unknown or the list is empty.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let strategies = parse_strategies(
            matches
                .get_one::<String>(ARG_STRATEGIES)
                .map_or("", String::as_str),
        )?;

        Ok(Self {
            strategies,
            bcrypt_cost: matches
                .get_one::<u32>(ARG_BCRYPT_COST)
                .copied()
                .unwrap_or(bcrypt::DEFAULT_COST),
            verification_ttl_seconds: matches
                .get_one::<i64>(ARG_VERIFICATION_TTL)
                .copied()
                .unwrap_or(1800),
            frontend_base_url: matches
                .get_one::<String>(ARG_FRONTEND_BASE_URL)
                .cloned()
                .context("missing required argument: --frontend-base-url")?,
            email_from: matches
                .get_one::<String>(ARG_EMAIL_FROM)
                .cloned()
                .context("missing required argument: --email-from")?,
            request_timeout_seconds: matches
                .get_one::<u64>(ARG_REQUEST_TIMEOUT)
                .copied()
                .unwrap_or(10),
        })
    }
}

/// Parse `credentials,personal_number`; duplicates are dropped.
///
/// # Errors
///
/// Returns an error on an unknown name or an empty list.
pub fn parse_strategies(value: &str) -> Result<Vec<StrategyKind>> {
    let mut strategies = Vec::new();
    for name in value.split(',').map(str::trim).filter(|name| !name.is_empty()) {
        let kind = name.parse::<StrategyKind>()?;
        if !strategies.contains(&kind) {
            strategies.push(kind);
        }
    }
    if strategies.is_empty() {
        anyhow::bail!("at least one strategy must be enabled");
    }
    Ok(strategies)
}
