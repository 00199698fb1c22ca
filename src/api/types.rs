//! Request/response bodies.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::engine::{Refreshed, TokenPair};
use crate::error::{Error, Result};
use crate::strategy::{CredentialsInput, PersonalNumberInput, StrategyInput, StrategyKind, StrategyOutput};
use crate::token::{SafeString, TokenClass, TokenClaims};

/// Strategy selector plus the fields that strategy reads.
///
/// Credentials needs `email` and `password`; personal number authentication
/// needs `number`; no-op needs nothing.
#[derive(ToSchema, Deserialize, Debug)]
pub struct StrategyRequest {
    pub strategy: StrategyKind,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub password: Option<SafeString>,
    #[serde(default)]
    pub number: Option<u64>,
}

impl StrategyRequest {
    /// Split into the kind and the typed input for it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Input`] if a field the strategy needs is missing.
    pub fn into_input(self) -> Result<(StrategyKind, StrategyInput)> {
        let input = match self.strategy {
            StrategyKind::Credentials => {
                let email = self
                    .email
                    .ok_or_else(|| Error::Input("missing email".to_string()))?;
                let password = self
                    .password
                    .ok_or_else(|| Error::Input("missing password".to_string()))?;
                StrategyInput::Credentials(CredentialsInput { email, password })
            }
            StrategyKind::PersonalNumber => StrategyInput::PersonalNumber(PersonalNumberInput {
                number: self.number,
            }),
            StrategyKind::NoOp => StrategyInput::NoOp,
        };
        Ok((self.strategy, input))
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct IdentityResponse {
    pub strategy: StrategyKind,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub number: Option<u64>,
}

impl From<&StrategyOutput> for IdentityResponse {
    fn from(output: &StrategyOutput) -> Self {
        let (email, number) = match output {
            StrategyOutput::Credentials(output) => (Some(output.email.clone()), None),
            StrategyOutput::PersonalNumber(output) => (None, Some(output.number)),
            StrategyOutput::NoOp => (None, None),
        };
        Self {
            strategy: output.kind(),
            email,
            number,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokensResponse {
    pub session_id: Uuid,
    pub access_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub access_token_expires_at: OffsetDateTime,
    pub refresh_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub refresh_token_expires_at: OffsetDateTime,
}

impl From<TokenPair> for TokensResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            session_id: pair.session_id,
            access_token: pair.access_token.expose().to_string(),
            access_token_expires_at: pair.access_claims.expires_at,
            refresh_token: pair.refresh_token.expose().to_string(),
            refresh_token_expires_at: pair.refresh_claims.expires_at,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AuthenticateResponse {
    pub identity: IdentityResponse,
    /// Absent for strategies that issue no tokens.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tokens: Option<TokensResponse>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ClaimsResponse {
    pub token_id: Uuid,
    pub class: String,
    pub strategy: StrategyKind,
    pub identifier: String,
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl From<TokenClaims> for ClaimsResponse {
    fn from(claims: TokenClaims) -> Self {
        Self {
            token_id: claims.id,
            class: match claims.class {
                TokenClass::Access => "access".to_string(),
                TokenClass::Refresh => "refresh".to_string(),
            },
            strategy: claims.strategy,
            identifier: claims.identifier.to_string(),
            issued_at: claims.issued_at,
            expires_at: claims.expires_at,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RefreshResponse {
    pub access_token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub access_token_expires_at: OffsetDateTime,
}

impl From<Refreshed> for RefreshResponse {
    fn from(refreshed: Refreshed) -> Self {
        Self {
            access_token: refreshed.access_token.expose().to_string(),
            access_token_expires_at: refreshed.access_claims.expires_at,
        }
    }
}
