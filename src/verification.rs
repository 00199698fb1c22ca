//! Out-of-band verification tokens: `<entity-id>/<random-token>`.
//!
//! The codec has no expiry of its own; the storage row it points at does.

use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

const SEPARATOR: char = '/';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationToken {
    pub entity_id: Uuid,
    pub token: Uuid,
}

impl VerificationToken {
    /// SHA-256 of the rendered token; the only form that gets stored.
    #[must_use]
    pub fn hash(&self) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(self.to_string().as_bytes());
        hasher.finalize().to_vec()
    }
}

impl fmt::Display for VerificationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.entity_id, self.token)
    }
}

impl FromStr for VerificationToken {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        parse_verification_token(value)
    }
}

/// Fresh token for `entity_id`.
#[must_use]
pub fn new_verification_token(entity_id: Uuid) -> VerificationToken {
    VerificationToken {
        entity_id,
        token: Uuid::new_v4(),
    }
}

/// Split a token into its entity id and random half.
///
/// # Errors
///
/// Returns [`Error::MalformedVerificationToken`] unless `value` is exactly two
/// `/`-separated UUIDs.
pub fn parse_verification_token(value: &str) -> Result<VerificationToken> {
    let mut parts = value.split(SEPARATOR);
    let (Some(entity_id), Some(token), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(Error::MalformedVerificationToken);
    };

    let entity_id = Uuid::parse_str(entity_id).map_err(|_| Error::MalformedVerificationToken)?;
    let token = Uuid::parse_str(token).map_err(|_| Error::MalformedVerificationToken)?;

    Ok(VerificationToken { entity_id, token })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_keeps_entity_id() -> Result<()> {
        let entity_id = Uuid::new_v4();
        let token = new_verification_token(entity_id);
        let rendered = token.to_string();
        assert!(rendered.starts_with(&entity_id.to_string()));
        assert_eq!(rendered.matches('/').count(), 1);

        let parsed = parse_verification_token(&rendered)?;
        assert_eq!(parsed.entity_id, entity_id);
        assert_eq!(parsed, token);
        assert_eq!(rendered.parse::<VerificationToken>()?, token);
        Ok(())
    }

    #[test]
    fn rejects_wrong_shapes() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        for value in [
            String::new(),
            a.to_string(),
            format!("{a}{b}"),
            format!("{a}/{b}/{a}"),
            format!("{a}/"),
            format!("/{b}"),
            format!("{a}/not-a-uuid"),
            format!("nope/{b}"),
        ] {
            assert!(
                matches!(
                    parse_verification_token(&value),
                    Err(Error::MalformedVerificationToken)
                ),
                "accepted {value:?}"
            );
        }
    }

    #[test]
    fn fresh_tokens_differ() {
        let entity_id = Uuid::new_v4();
        let first = new_verification_token(entity_id);
        let second = new_verification_token(entity_id);
        assert_ne!(first.token, second.token);
        assert_ne!(first.hash(), second.hash());
        assert_eq!(first.hash().len(), 32);
    }
}
