//! # Tessera (authentication strategies & sealed tokens)
//!
//! `tessera` lets an identity service register and authenticate callers through
//! several incompatible strategies behind one contract, and hands out sealed
//! `v4.local` PASETO access/refresh tokens bound to exactly one strategy and one
//! identifier.
//!
//! ## Strategies
//!
//! - **Credentials:** email + password, stored as a bcrypt hash. Registration
//!   also sends a best-effort verification email.
//! - **Personal number:** a random 16-digit number generated server-side.
//! - **No-op:** always succeeds, persists nothing; meant for tests.
//!
//! The [`engine::Engine`] selects a strategy by [`strategy::StrategyKind`],
//! moves a typed [`exchange::Exchange`] through it and turns the published
//! output into tokens and a session.
//!
//! ## Tokens & sessions
//!
//! Token verification is stateless: a blocked session does not invalidate an
//! access token that is still inside its window. Refreshing does check the
//! session, so a blocked session can never mint new access tokens.

pub mod api;
pub mod cli;
pub mod email;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod password;
pub mod session;
pub mod storage;
pub mod strategy;
pub mod token;
pub mod verification;

pub use error::{Error, Result};

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
