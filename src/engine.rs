//! Request orchestration.
//!
//! [`Engine`] picks the strategy for a [`StrategyKind`], threads an
//! [`Exchange`] through it and turns the published output into tokens and a
//! session. Every operation runs under the configured request timeout.

use std::future::Future;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::email::EmailSender;
use crate::error::{Code, Error, Result, Stage};
use crate::exchange::Exchange;
use crate::session::{NewSession, SessionManager};
use crate::storage::{Confirmation, Storage, CREDENTIALS, VERIFICATION};
use crate::strategy::{Strategies, StrategyDeps, StrategyInput, StrategyKind, StrategyOutput};
use crate::token::{Identifier, SafeString, TokenClaims, TokenMaker};
use crate::verification::parse_verification_token;

const DEFAULT_VERIFICATION_TTL_SECONDS: i64 = 30 * 60;
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 10;
const DEFAULT_FRONTEND_BASE_URL: &str = "http://localhost:8080/";
const DEFAULT_EMAIL_FROM: &str = "no-reply@tessera.local";

#[derive(Clone, Debug)]
pub struct EngineConfig {
    strategies: Vec<StrategyKind>,
    bcrypt_cost: u32,
    verification_ttl_seconds: i64,
    request_timeout: std::time::Duration,
    frontend_base_url: String,
    email_from: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strategies: StrategyKind::ALL.to_vec(),
            bcrypt_cost: bcrypt::DEFAULT_COST,
            verification_ttl_seconds: DEFAULT_VERIFICATION_TTL_SECONDS,
            request_timeout: std::time::Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECONDS),
            frontend_base_url: DEFAULT_FRONTEND_BASE_URL.to_string(),
            email_from: DEFAULT_EMAIL_FROM.to_string(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_strategies(mut self, strategies: Vec<StrategyKind>) -> Self {
        self.strategies = strategies;
        self
    }

    #[must_use]
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    #[must_use]
    pub fn with_verification_ttl_seconds(mut self, seconds: i64) -> Self {
        self.verification_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_frontend_base_url(mut self, url: String) -> Self {
        self.frontend_base_url = url;
        self
    }

    #[must_use]
    pub fn with_email_from(mut self, from: String) -> Self {
        self.email_from = from;
        self
    }

    #[must_use]
    pub fn strategies(&self) -> &[StrategyKind] {
        &self.strategies
    }

    #[must_use]
    pub fn bcrypt_cost(&self) -> u32 {
        self.bcrypt_cost
    }

    #[must_use]
    pub fn verification_ttl(&self) -> time::Duration {
        time::Duration::seconds(self.verification_ttl_seconds)
    }

    #[must_use]
    pub fn request_timeout(&self) -> std::time::Duration {
        self.request_timeout
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn email_from(&self) -> &str {
        &self.email_from
    }
}

/// Where an authentication request came from.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub client_ip: String,
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub session_id: Uuid,
    pub access_token: SafeString,
    pub access_claims: TokenClaims,
    pub refresh_token: SafeString,
    pub refresh_claims: TokenClaims,
}

/// Result of a successful authentication.
///
/// `tokens` is `None` for strategies that publish no identifier (no-op).
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub output: StrategyOutput,
    pub tokens: Option<TokenPair>,
}

#[derive(Debug, Clone)]
pub struct Refreshed {
    pub access_token: SafeString,
    pub access_claims: TokenClaims,
}

pub struct Engine {
    strategies: Strategies,
    storage: Arc<dyn Storage>,
    sessions: SessionManager,
    tokens: Arc<TokenMaker>,
    config: EngineConfig,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("strategies", &self.strategies)
            .field("tokens", &self.tokens)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Wire the collaborators and build the enabled strategies.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no strategy is enabled or a strategy is
    /// misconfigured.
    pub fn new(
        storage: Arc<dyn Storage>,
        email: Arc<dyn EmailSender>,
        tokens: Arc<TokenMaker>,
        config: EngineConfig,
    ) -> Result<Self> {
        let sessions = SessionManager::new(storage.clone());
        let deps = StrategyDeps {
            storage: storage.clone(),
            email,
            sessions: sessions.clone(),
            config: config.clone(),
        };
        let strategies = Strategies::new(config.strategies(), &deps)?;
        info!(enabled = ?strategies.enabled(), "strategies ready");

        Ok(Self {
            strategies,
            storage,
            sessions,
            tokens,
            config,
        })
    }

    #[must_use]
    pub fn enabled_strategies(&self) -> Vec<StrategyKind> {
        self.strategies.enabled()
    }

    #[must_use]
    pub fn token_maker(&self) -> &TokenMaker {
        &self.tokens
    }

    /// Register a new identity with `kind`.
    ///
    /// # Errors
    ///
    /// Returns the strategy's error wrapped in [`Error::Stage`], or
    /// [`Error::StrategyDisabled`], [`Error::Input`] when `input` belongs to a
    /// different kind, and [`Error::DeadlineExceeded`].
    #[instrument(skip(self, input), fields(strategy = %kind))]
    pub async fn register(&self, kind: StrategyKind, input: StrategyInput) -> Result<StrategyOutput> {
        check_input(kind, &input)?;
        let strategy = self.strategies.get(kind)?;

        self.deadline(async {
            let exchange = strategy
                .register(Exchange::new().with_input(input))
                .await
                .map_err(|err| staged(err, kind, Stage::Register))?;
            let output = exchange.output(kind)?.clone();
            debug!("registered");
            Ok(output)
        })
        .await
    }

    /// Authenticate with `kind`, mint a token pair and open a session.
    ///
    /// # Errors
    ///
    /// Same as [`Engine::register`], plus token and session errors.
    #[instrument(skip(self, input, client), fields(strategy = %kind))]
    pub async fn authenticate(
        &self,
        kind: StrategyKind,
        input: StrategyInput,
        client: ClientMeta,
    ) -> Result<Authenticated> {
        check_input(kind, &input)?;
        let strategy = self.strategies.get(kind)?;

        self.deadline(async {
            let exchange = strategy
                .authenticate(Exchange::new().with_input(input))
                .await
                .map_err(|err| staged(err, kind, Stage::Authenticate))?;
            let output = exchange.output(kind)?.clone();

            let Some(identifier) = Identifier::for_output(&output) else {
                debug!("strategy publishes no identifier, no tokens issued");
                return Ok(Authenticated {
                    output,
                    tokens: None,
                });
            };

            let (access_token, access_claims) = self.tokens.make_access_token(&identifier, kind)?;
            let (refresh_token, refresh_claims) =
                self.tokens.make_refresh_token(&identifier, kind)?;

            let session = self
                .sessions
                .create_session(NewSession {
                    id: refresh_claims.id,
                    owner: identifier.to_string(),
                    client_ip: client.client_ip,
                    user_agent: client.user_agent,
                    refresh_token: refresh_token.clone(),
                    expires_at: refresh_claims.expires_at,
                })
                .await?;

            Ok(Authenticated {
                output,
                tokens: Some(TokenPair {
                    session_id: session.id,
                    access_token,
                    access_claims,
                    refresh_token,
                    refresh_claims,
                }),
            })
        })
        .await
    }

    /// Verify an access token. Stateless: sessions are not consulted.
    ///
    /// # Errors
    ///
    /// Returns the token error, including [`Error::WrongTokenClass`] for a
    /// refresh token.
    pub fn verify(&self, access_token: &str) -> Result<TokenClaims> {
        self.tokens.verify_access(access_token)
    }

    /// Mint a new access token from a refresh token backed by an active session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionBlocked`] for a blocked session, token errors
    /// for a bad refresh token, [`Error::NotFound`] if the session is gone.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<Refreshed> {
        let claims = self.tokens.verify_refresh(refresh_token)?;

        self.deadline(async {
            let session = self.sessions.read_session(claims.id).await?;
            if !session.is_active {
                warn!(session_id = %session.id, "refresh on blocked session");
                return Err(Error::SessionBlocked);
            }
            if OffsetDateTime::now_utc() > session.expires_at {
                return Err(Error::ExpiredToken);
            }
            if session.refresh_token.expose() != refresh_token
                || session.owner != claims.identifier.to_string()
            {
                warn!(session_id = %session.id, "refresh token does not match its session");
                return Err(Error::TamperedToken);
            }

            let (access_token, access_claims) = self
                .tokens
                .make_access_token(&claims.identifier, claims.strategy)?;
            Ok(Refreshed {
                access_token,
                access_claims,
            })
        })
        .await
    }

    /// Block the session a refresh token belongs to, through the strategy that
    /// issued it.
    ///
    /// # Errors
    ///
    /// Returns token errors, [`Error::StrategyDisabled`] if the issuing
    /// strategy is no longer enabled, or [`Error::NotFound`].
    #[instrument(skip_all)]
    pub async fn revoke(&self, refresh_token: &str) -> Result<()> {
        let claims = self.tokens.verify_refresh(refresh_token)?;
        let strategy = self.strategies.get(claims.strategy)?;

        self.deadline(async {
            let exchange = Exchange::new().with_session(claims.id);
            strategy
                .revoke(&exchange)
                .await
                .map_err(|err| staged(err, claims.strategy, Stage::Revoke))?;
            info!(session_id = %claims.id, "session revoked");
            Ok(())
        })
        .await
    }

    /// Consume an emailed verification token and mark its credentials verified.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedVerificationToken`], or [`Error::NotFound`]
    /// if the token is unknown, expired or already used.
    #[instrument(skip_all)]
    pub async fn confirm_verification(&self, token: &str) -> Result<()> {
        let token = parse_verification_token(token)?;

        self.deadline(async {
            let now = OffsetDateTime::now_utc();
            match self
                .storage
                .confirm_verification(token.entity_id, &token.hash(), now)
                .await?
            {
                Confirmation::Verified => {
                    info!(credentials_id = %token.entity_id, "email verified");
                    Ok(())
                }
                Confirmation::TokenUnavailable => Err(Error::NotFound {
                    entity: VERIFICATION,
                    key: token.entity_id.to_string(),
                }),
                Confirmation::CredentialsMissing => Err(Error::NotFound {
                    entity: CREDENTIALS,
                    key: token.entity_id.to_string(),
                }),
            }
        })
        .await
    }

    /// # Errors
    ///
    /// Returns the storage error if the backend is unreachable.
    pub async fn ping(&self) -> Result<()> {
        self.deadline(self.storage.ping()).await
    }

    async fn deadline<T, F>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.config.request_timeout(), operation)
            .await
            .map_err(|_| Error::DeadlineExceeded)?
    }
}

fn check_input(kind: StrategyKind, input: &StrategyInput) -> Result<()> {
    if input.kind() == kind {
        Ok(())
    } else {
        Err(Error::Input(format!(
            "{} input sent to {kind} strategy",
            input.kind()
        )))
    }
}

fn staged(err: Error, strategy: StrategyKind, stage: Stage) -> Error {
    let err = err.in_stage(strategy, stage);
    if err.code() == Code::Internal {
        error!("{err}");
    } else {
        debug!("{err}");
    }
    err
}
