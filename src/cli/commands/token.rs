use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_TOKEN_KEY: &str = "token-key";
pub const ARG_ACCESS_TTL: &str = "access-token-ttl-seconds";
pub const ARG_REFRESH_TTL: &str = "refresh-token-ttl-seconds";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TOKEN_KEY)
                .long(ARG_TOKEN_KEY)
                .help("Base64 encoded 32-byte symmetric key used to seal tokens")
                .env("TESSERA_TOKEN_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_ACCESS_TTL)
                .long(ARG_ACCESS_TTL)
                .help("Access token lifetime in seconds")
                .env("TESSERA_ACCESS_TOKEN_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TTL)
                .long(ARG_REFRESH_TTL)
                .help("Refresh token and session lifetime in seconds")
                .env("TESSERA_REFRESH_TOKEN_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub key: SecretString,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
}

impl Options {
    /// # Errors
    ///
    /// Returns an error if the token key is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let key = matches
            .get_one::<String>(ARG_TOKEN_KEY)
            .cloned()
            .context("missing required argument: --token-key")?;

        Ok(Self {
            key: SecretString::from(key),
            access_ttl_seconds: matches.get_one::<i64>(ARG_ACCESS_TTL).copied().unwrap_or(900),
            refresh_ttl_seconds: matches
                .get_one::<i64>(ARG_REFRESH_TTL)
                .copied()
                .unwrap_or(86_400),
        })
    }
}
