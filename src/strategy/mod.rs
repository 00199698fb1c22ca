//! Registration/authentication strategies.
//!
//! Every variant implements [`Strategy`]. The [`Strategies`] registry builds
//! the enabled variants once, with an exhaustive `match` over [`StrategyKind`],
//! and refuses to start if a variant reports a kind other than the one it was
//! built for.

pub mod credentials;
pub mod noop;
pub mod personal_number;

pub use credentials::CredentialsStrategy;
pub use noop::NoOpStrategy;
pub use personal_number::PersonalNumberStrategy;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::email::EmailSender;
use crate::engine::EngineConfig;
use crate::error::{Error, Result, Slot};
use crate::exchange::Exchange;
use crate::session::SessionManager;
use crate::storage::Storage;
use crate::token::SafeString;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum StrategyKind {
    #[serde(rename = "credentials")]
    Credentials,
    #[serde(rename = "personal_number")]
    PersonalNumber,
    #[serde(rename = "noop")]
    NoOp,
}

impl StrategyKind {
    pub const ALL: [Self; 3] = [Self::Credentials, Self::PersonalNumber, Self::NoOp];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Credentials => "credentials",
            Self::PersonalNumber => "personal_number",
            Self::NoOp => "noop",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "credentials" => Ok(Self::Credentials),
            "personal_number" | "personal-number" => Ok(Self::PersonalNumber),
            "noop" | "no-op" => Ok(Self::NoOp),
            other => Err(Error::Input(format!("unknown strategy: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialsInput {
    pub email: String,
    pub password: SafeString,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialsOutput {
    pub email: String,
}

/// `number` is absent on registration and names the identity on authentication.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonalNumberInput {
    pub number: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PersonalNumberOutput {
    pub number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyInput {
    Credentials(CredentialsInput),
    PersonalNumber(PersonalNumberInput),
    NoOp,
}

impl StrategyInput {
    #[must_use]
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Credentials(_) => StrategyKind::Credentials,
            Self::PersonalNumber(_) => StrategyKind::PersonalNumber,
            Self::NoOp => StrategyKind::NoOp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutput {
    Credentials(CredentialsOutput),
    PersonalNumber(PersonalNumberOutput),
    NoOp,
}

impl StrategyOutput {
    #[must_use]
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Credentials(_) => StrategyKind::Credentials,
            Self::PersonalNumber(_) => StrategyKind::PersonalNumber,
            Self::NoOp => StrategyKind::NoOp,
        }
    }
}

/// Typed view of one variant of [`StrategyInput`] or [`StrategyOutput`].
pub trait Payload<T>: Sized {
    const KIND: StrategyKind;

    fn from_ref(value: &T) -> Option<&Self>;
}

macro_rules! payload {
    ($ty:ty, $container:ident, $variant:ident) => {
        impl Payload<$container> for $ty {
            const KIND: StrategyKind = StrategyKind::$variant;

            fn from_ref(value: &$container) -> Option<&Self> {
                match value {
                    $container::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

payload!(CredentialsInput, StrategyInput, Credentials);
payload!(PersonalNumberInput, StrategyInput, PersonalNumber);
payload!(CredentialsOutput, StrategyOutput, Credentials);
payload!(PersonalNumberOutput, StrategyOutput, PersonalNumber);

/// Contract shared by every registration/authentication method.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// The kind this variant implements.
    fn configured_strategy(&self) -> StrategyKind;

    /// Run the registration side effect and publish the output.
    async fn register(&self, exchange: Exchange) -> Result<Exchange>;

    /// Check a previously registered identity and publish the output.
    async fn authenticate(&self, exchange: Exchange) -> Result<Exchange>;

    /// Block the session named in the exchange.
    async fn revoke(&self, exchange: &Exchange) -> Result<()>;
}

/// Collaborators handed to each variant at construction.
#[derive(Clone)]
pub struct StrategyDeps {
    pub storage: Arc<dyn Storage>,
    pub email: Arc<dyn EmailSender>,
    pub sessions: SessionManager,
    pub config: EngineConfig,
}

/// The enabled strategies, keyed by kind.
pub struct Strategies {
    variants: HashMap<StrategyKind, Box<dyn Strategy>>,
}

impl fmt::Debug for Strategies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Strategies")
            .field("enabled", &self.enabled())
            .finish()
    }
}

impl Strategies {
    /// Build and validate the enabled variants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if nothing is enabled or a variant reports a
    /// kind different from the one it was built for.
    pub fn new(enabled: &[StrategyKind], deps: &StrategyDeps) -> Result<Self> {
        if enabled.is_empty() {
            return Err(Error::Config("no strategy enabled".to_string()));
        }

        let mut variants = HashMap::new();
        for &kind in enabled {
            let variant: Box<dyn Strategy> = match kind {
                StrategyKind::Credentials => Box::new(CredentialsStrategy::new(deps.clone())),
                StrategyKind::PersonalNumber => {
                    Box::new(PersonalNumberStrategy::new(deps.clone()))
                }
                StrategyKind::NoOp => Box::new(NoOpStrategy::new(deps.sessions.clone())),
            };
            Self::check(kind, variant.as_ref())?;
            variants.insert(kind, variant);
        }

        Ok(Self { variants })
    }

    /// Look up the variant for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StrategyDisabled`] if `kind` is not enabled.
    pub fn get(&self, kind: StrategyKind) -> Result<&dyn Strategy> {
        let variant = self
            .variants
            .get(&kind)
            .ok_or(Error::StrategyDisabled(kind))?;
        Self::check(kind, variant.as_ref())?;
        Ok(variant.as_ref())
    }

    #[must_use]
    pub fn enabled(&self) -> Vec<StrategyKind> {
        StrategyKind::ALL
            .into_iter()
            .filter(|kind| self.variants.contains_key(kind))
            .collect()
    }

    fn check(kind: StrategyKind, variant: &dyn Strategy) -> Result<()> {
        let configured = variant.configured_strategy();
        if configured == kind {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "strategy registered as {kind} reports {configured}"
            )))
        }
    }
}

/// Read the session id a revocation targets.
pub(crate) fn session_to_revoke(exchange: &Exchange, kind: StrategyKind) -> Result<uuid::Uuid> {
    exchange.session().ok_or(Error::NotInExchange {
        kind,
        slot: Slot::Session,
    })
}
