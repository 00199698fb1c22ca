use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use std::fmt;

const REDACTED: &str = "[REDACTED]";

/// String that never shows its value in `Display`, `Debug` or log fields.
///
/// Used for sealed tokens and plaintext passwords; call [`SafeString::expose`]
/// where the raw value is genuinely needed.
#[derive(Clone, Default)]
pub struct SafeString(SecretString);

impl SafeString {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expose().is_empty()
    }
}

impl From<String> for SafeString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SafeString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl PartialEq for SafeString {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for SafeString {}

impl fmt::Display for SafeString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl fmt::Debug for SafeString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<'de> Deserialize<'de> for SafeString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Self::new)
    }
}
