//! Error taxonomy shared by strategies, tokens, sessions and storage.

use std::fmt;
use thiserror::Error;

use crate::strategy::StrategyKind;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Which half of the exchange a lookup targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Input,
    Output,
    Session,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Session => "session",
        })
    }
}

/// Request stage an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Register,
    Authenticate,
    Revoke,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Register => "register",
            Self::Authenticate => "authenticate",
            Self::Revoke => "revoke",
        })
    }
}

/// Transport-neutral status an error is surfaced as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    InvalidArgument,
    AlreadyExists,
    NotFound,
    Unauthenticated,
    DeadlineExceeded,
    Internal,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    Input(String),
    #[error("{kind} {slot} not found in exchange")]
    NotInExchange { kind: StrategyKind, slot: Slot },
    #[error("strategy {0} is not enabled")]
    StrategyDisabled(StrategyKind),
    #[error("malformed verification token")]
    MalformedVerificationToken,
    #[error("{entity} already exists")]
    DuplicateEntry { entity: &'static str },
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },
    #[error("unexpected rows affected: expected {expected}, got {actual}")]
    UnexpectedRowsAffected { expected: u64, actual: u64 },
    #[error("storage operation {operation} failed")]
    Storage {
        operation: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("password hashing failed")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("blocking task failed")]
    Blocking(#[from] tokio::task::JoinError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("identifier does not match strategy {0}")]
    IdentifierMismatch(StrategyKind),
    #[error("token expired")]
    ExpiredToken,
    #[error("token not yet valid")]
    NotYetValid,
    #[error("token failed authentication")]
    TamperedToken,
    #[error("malformed token")]
    MalformedToken,
    #[error("unexpected token class")]
    WrongTokenClass,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("session is blocked")]
    SessionBlocked,
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("{strategy} {stage} failed: {source}")]
    Stage {
        strategy: StrategyKind,
        stage: Stage,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap a storage driver error.
    pub fn storage<E>(operation: &'static str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage {
            operation,
            source: Box::new(source),
        }
    }

    /// Attach the strategy and stage to an error; already staged errors are kept as is.
    #[must_use]
    pub fn in_stage(self, strategy: StrategyKind, stage: Stage) -> Self {
        match self {
            staged @ Self::Stage { .. } => staged,
            other => Self::Stage {
                strategy,
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, looking through stage wrappers.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    #[must_use]
    pub fn code(&self) -> Code {
        match self.root() {
            Self::Input(_)
            | Self::NotInExchange { .. }
            | Self::StrategyDisabled(_)
            | Self::MalformedVerificationToken => Code::InvalidArgument,
            Self::DuplicateEntry { .. } => Code::AlreadyExists,
            Self::NotFound { .. } => Code::NotFound,
            Self::ExpiredToken
            | Self::NotYetValid
            | Self::TamperedToken
            | Self::MalformedToken
            | Self::WrongTokenClass
            | Self::InvalidCredentials
            | Self::SessionBlocked => Code::Unauthenticated,
            Self::DeadlineExceeded => Code::DeadlineExceeded,
            Self::UnexpectedRowsAffected { .. }
            | Self::Storage { .. }
            | Self::Hash(_)
            | Self::Blocking(_)
            | Self::Config(_)
            | Self::IdentifierMismatch(_)
            | Self::Stage { .. } => Code::Internal,
        }
    }

    /// Message safe to hand back to a caller.
    ///
    /// Internal failures collapse into a generic message; storage details,
    /// hashes and tokens never leave the process.
    #[must_use]
    pub fn public_message(&self) -> String {
        let root = self.root();
        match root.code() {
            Code::Internal => "internal error".to_string(),
            Code::NotFound => match root {
                Self::NotFound { entity, .. } => format!("{entity} not found"),
                _ => "not found".to_string(),
            },
            Code::Unauthenticated => match root {
                Self::ExpiredToken => "token expired".to_string(),
                Self::NotYetValid => "token not yet valid".to_string(),
                Self::InvalidCredentials => "invalid credentials".to_string(),
                Self::SessionBlocked => "session is blocked".to_string(),
                _ => "invalid token".to_string(),
            },
            _ => root.to_string(),
        }
    }
}

/// Require that a write touched exactly one row.
///
/// # Errors
///
/// Returns [`Error::UnexpectedRowsAffected`] for any other count.
pub fn expect_one_row(rows: u64) -> Result<()> {
    if rows == 1 {
        Ok(())
    } else {
        Err(Error::UnexpectedRowsAffected {
            expected: 1,
            actual: rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_looks_through_stage() {
        let err = Error::DuplicateEntry {
            entity: "credentials",
        }
        .in_stage(StrategyKind::Credentials, Stage::Register);
        assert_eq!(err.code(), Code::AlreadyExists);
        assert_eq!(
            err.to_string(),
            "credentials register failed: credentials already exists"
        );
    }

    #[test]
    fn in_stage_does_not_double_wrap() {
        let err = Error::InvalidCredentials
            .in_stage(StrategyKind::Credentials, Stage::Authenticate)
            .in_stage(StrategyKind::NoOp, Stage::Register);
        assert!(matches!(
            err,
            Error::Stage {
                strategy: StrategyKind::Credentials,
                stage: Stage::Authenticate,
                ..
            }
        ));
    }

    #[test]
    fn public_message_hides_internal_details() {
        let err = Error::storage(
            "insert_credentials",
            std::io::Error::other("password_hash=$2b$04$secret"),
        );
        assert_eq!(err.code(), Code::Internal);
        assert_eq!(err.public_message(), "internal error");

        let err = Error::NotFound {
            entity: "session",
            key: "0191".to_string(),
        };
        assert_eq!(err.public_message(), "session not found");
    }

    #[test]
    fn token_errors_are_unauthenticated() {
        for err in [
            Error::ExpiredToken,
            Error::NotYetValid,
            Error::TamperedToken,
            Error::MalformedToken,
            Error::SessionBlocked,
        ] {
            assert_eq!(err.code(), Code::Unauthenticated);
        }
        assert_eq!(Error::TamperedToken.public_message(), "invalid token");
    }

    #[test]
    fn expect_one_row_rejects_other_counts() {
        assert!(expect_one_row(1).is_ok());
        assert!(matches!(
            expect_one_row(0),
            Err(Error::UnexpectedRowsAffected {
                expected: 1,
                actual: 0
            })
        ));
        assert!(matches!(
            expect_one_row(2),
            Err(Error::UnexpectedRowsAffected { actual: 2, .. })
        ));
    }
}
