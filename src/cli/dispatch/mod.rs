//! Map parsed arguments to an [`Action`].

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, token, CMD_KEYGEN};
use anyhow::Result;

/// # Errors
///
/// Returns an error if required arguments are missing or invalid.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    if matches.subcommand_name() == Some(CMD_KEYGEN) {
        return Ok(Action::Keygen);
    }

    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches.get_one::<String>("dsn").cloned();

    let token_opts = token::Options::parse(matches)?;
    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        token_key: token_opts.key,
        access_ttl_seconds: token_opts.access_ttl_seconds,
        refresh_ttl_seconds: token_opts.refresh_ttl_seconds,
        strategies: auth_opts.strategies,
        bcrypt_cost: auth_opts.bcrypt_cost,
        verification_ttl_seconds: auth_opts.verification_ttl_seconds,
        frontend_base_url: auth_opts.frontend_base_url,
        email_from: auth_opts.email_from,
        request_timeout_seconds: auth_opts.request_timeout_seconds,
    }))
}
