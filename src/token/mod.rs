//! Sealed access/refresh tokens.
//!
//! Tokens are PASETO `v4.local` (XChaCha20 + BLAKE2b authenticated encryption)
//! sealing a JSON claims set. A claims set binds one [`Identifier`] to the
//! [`StrategyKind`] that produced it; the binding is checked both when minting
//! and when verifying.

mod safe;

pub use safe::SafeString;

use pasetors::errors::Error as PasetorsError;
use pasetors::keys::SymmetricKey;
use pasetors::token::UntrustedToken;
use pasetors::version4::{LocalToken, V4};
use pasetors::Local;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::strategy::{StrategyKind, StrategyOutput};

/// Required symmetric key length in bytes.
pub const KEY_LENGTH: usize = 32;

/// Value a token is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identifier {
    String(String),
    Numeric(u64),
}

impl Identifier {
    /// Identifier published by a strategy, if the strategy has one.
    #[must_use]
    pub fn for_output(output: &StrategyOutput) -> Option<Self> {
        match output {
            StrategyOutput::Credentials(output) => Some(Self::String(output.email.clone())),
            StrategyOutput::PersonalNumber(output) => Some(Self::Numeric(output.number)),
            StrategyOutput::NoOp => None,
        }
    }

    /// Whether this identifier has the type `strategy` issues.
    #[must_use]
    pub fn matches(&self, strategy: StrategyKind) -> bool {
        match strategy {
            StrategyKind::Credentials => matches!(self, Self::String(_)),
            StrategyKind::PersonalNumber => matches!(self, Self::Numeric(_)),
            StrategyKind::NoOp => false,
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(value) => f.write_str(value),
            Self::Numeric(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenClass {
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(rename = "jti")]
    pub id: Uuid,
    #[serde(rename = "typ")]
    pub class: TokenClass,
    #[serde(rename = "sub")]
    pub identifier: Identifier,
    pub strategy: StrategyKind,
    #[serde(rename = "iat", with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,
    #[serde(rename = "nbf", with = "time::serde::rfc3339")]
    pub not_before: OffsetDateTime,
    #[serde(rename = "exp", with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl TokenClaims {
    fn validate_at(&self, now: OffsetDateTime) -> Result<()> {
        if !self.identifier.matches(self.strategy) {
            return Err(Error::IdentifierMismatch(self.strategy));
        }
        if now < self.not_before {
            return Err(Error::NotYetValid);
        }
        if now > self.expires_at {
            return Err(Error::ExpiredToken);
        }
        Ok(())
    }
}

/// Issues and verifies sealed tokens under one symmetric key.
pub struct TokenMaker {
    key: SymmetricKey<V4>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl fmt::Debug for TokenMaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenMaker")
            .field("key", &"[REDACTED]")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

impl TokenMaker {
    /// Build a token maker.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the key is not exactly [`KEY_LENGTH`] bytes
    /// or a duration is not positive.
    pub fn new(key: &[u8], access_ttl: Duration, refresh_ttl: Duration) -> Result<Self> {
        if key.len() != KEY_LENGTH {
            return Err(Error::Config(format!(
                "token key must be {KEY_LENGTH} bytes, got {}",
                key.len()
            )));
        }
        if !access_ttl.is_positive() || !refresh_ttl.is_positive() {
            return Err(Error::Config(
                "token durations must be positive".to_string(),
            ));
        }
        let key = SymmetricKey::<V4>::from(key)
            .map_err(|err| Error::Config(format!("invalid token key: {err}")))?;

        Ok(Self {
            key,
            access_ttl,
            refresh_ttl,
        })
    }

    /// Random key suitable for [`TokenMaker::new`].
    #[must_use]
    pub fn generate_key() -> [u8; KEY_LENGTH] {
        let mut key = [0u8; KEY_LENGTH];
        OsRng.fill_bytes(&mut key);
        key
    }

    #[must_use]
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Mint an access token for `identifier`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdentifierMismatch`] if the identifier type is not the
    /// one `strategy` issues.
    pub fn make_access_token(
        &self,
        identifier: &Identifier,
        strategy: StrategyKind,
    ) -> Result<(SafeString, TokenClaims)> {
        self.make_at(
            TokenClass::Access,
            identifier,
            strategy,
            OffsetDateTime::now_utc(),
        )
    }

    /// Mint a refresh token for `identifier`.
    ///
    /// # Errors
    ///
    /// Same as [`TokenMaker::make_access_token`].
    pub fn make_refresh_token(
        &self,
        identifier: &Identifier,
        strategy: StrategyKind,
    ) -> Result<(SafeString, TokenClaims)> {
        self.make_at(
            TokenClass::Refresh,
            identifier,
            strategy,
            OffsetDateTime::now_utc(),
        )
    }

    /// Mint a token as if the current time were `now`.
    ///
    /// # Errors
    ///
    /// Same as [`TokenMaker::make_access_token`], plus sealing failures.
    pub fn make_at(
        &self,
        class: TokenClass,
        identifier: &Identifier,
        strategy: StrategyKind,
        now: OffsetDateTime,
    ) -> Result<(SafeString, TokenClaims)> {
        if !identifier.matches(strategy) {
            return Err(Error::IdentifierMismatch(strategy));
        }

        // RFC 3339 in the payload has second precision
        let now = now.replace_nanosecond(0).unwrap_or(now);
        let ttl = match class {
            TokenClass::Access => self.access_ttl,
            TokenClass::Refresh => self.refresh_ttl,
        };
        let claims = TokenClaims {
            id: Uuid::new_v4(),
            class,
            identifier: identifier.clone(),
            strategy,
            issued_at: now,
            not_before: now,
            expires_at: now + ttl,
        };

        let payload = serde_json::to_vec(&claims).map_err(|_| Error::MalformedToken)?;
        let token = LocalToken::encrypt(&self.key, &payload, None, None)
            .map_err(|err| Error::Config(format!("failed to seal token: {err}")))?;

        debug!(token_id = %claims.id, ?class, %strategy, "token issued");

        Ok((SafeString::new(token), claims))
    }

    /// Unseal and validate a token of any class.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedToken`], [`Error::TamperedToken`],
    /// [`Error::NotYetValid`] or [`Error::ExpiredToken`].
    pub fn verify(&self, token: &str) -> Result<TokenClaims> {
        self.verify_at(token, OffsetDateTime::now_utc())
    }

    /// Like [`TokenMaker::verify`], evaluating the time window at `now`.
    ///
    /// # Errors
    ///
    /// Same as [`TokenMaker::verify`].
    pub fn verify_at(&self, token: &str, now: OffsetDateTime) -> Result<TokenClaims> {
        let untrusted =
            UntrustedToken::<Local, V4>::try_from(token).map_err(|err| map_paseto_error(&err))?;
        let trusted = LocalToken::decrypt(&self.key, &untrusted, None, None)
            .map_err(|err| map_paseto_error(&err))?;
        let claims: TokenClaims =
            serde_json::from_str(trusted.payload()).map_err(|_| Error::MalformedToken)?;
        claims.validate_at(now)?;
        Ok(claims)
    }

    /// Verify a token and require it to be an access token.
    ///
    /// # Errors
    ///
    /// Same as [`TokenMaker::verify`], plus [`Error::WrongTokenClass`].
    pub fn verify_access(&self, token: &str) -> Result<TokenClaims> {
        expect_class(self.verify(token)?, TokenClass::Access)
    }

    /// Verify a token and require it to be a refresh token.
    ///
    /// # Errors
    ///
    /// Same as [`TokenMaker::verify`], plus [`Error::WrongTokenClass`].
    pub fn verify_refresh(&self, token: &str) -> Result<TokenClaims> {
        expect_class(self.verify(token)?, TokenClass::Refresh)
    }
}

fn expect_class(claims: TokenClaims, class: TokenClass) -> Result<TokenClaims> {
    if claims.class == class {
        Ok(claims)
    } else {
        Err(Error::WrongTokenClass)
    }
}

fn map_paseto_error(err: &PasetorsError) -> Error {
    match err {
        PasetorsError::TokenValidation => Error::TamperedToken,
        _ => Error::MalformedToken,
    }
}
