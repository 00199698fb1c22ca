use anyhow::{anyhow, Context, Result};
use base64ct::{Base64, Encoding};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

use crate::api;
use crate::email::LogEmailSender;
use crate::engine::{Engine, EngineConfig};
use crate::storage::{MemoryStorage, PostgresStorage, Storage};
use crate::strategy::StrategyKind;
use crate::token::TokenMaker;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub token_key: SecretString,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub strategies: Vec<StrategyKind>,
    pub bcrypt_cost: u32,
    pub verification_ttl_seconds: i64,
    pub frontend_base_url: String,
    pub email_from: String,
    pub request_timeout_seconds: u64,
}

impl Args {
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_strategies(self.strategies.clone())
            .with_bcrypt_cost(self.bcrypt_cost)
            .with_verification_ttl_seconds(self.verification_ttl_seconds)
            .with_request_timeout(Duration::from_secs(self.request_timeout_seconds))
            .with_frontend_base_url(self.frontend_base_url.clone())
            .with_email_from(self.email_from.clone())
    }

    /// # Errors
    ///
    /// Returns an error if the key is not base64 or not 32 bytes, or a TTL is
    /// not positive.
    pub fn token_maker(&self) -> Result<TokenMaker> {
        let key = decode_token_key(&self.token_key)?;
        TokenMaker::new(
            &key,
            time::Duration::seconds(self.access_ttl_seconds),
            time::Duration::seconds(self.refresh_ttl_seconds),
        )
        .context("Invalid token configuration")
    }
}

fn decode_token_key(key: &SecretString) -> Result<Vec<u8>> {
    Base64::decode_vec(key.expose_secret().trim())
        .map_err(|err| anyhow!("Token key is not valid base64: {err}"))
}

async fn storage(dsn: Option<&str>) -> Result<Arc<dyn Storage>> {
    let Some(dsn) = dsn else {
        warn!("No DSN configured, keeping all state in memory");
        return Ok(Arc::new(MemoryStorage::new()));
    };

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("Failed to connect to database")?;

    let storage = PostgresStorage::new(pool);
    storage
        .ensure_schema()
        .await
        .context("Failed to apply database schema")?;

    Ok(Arc::new(storage))
}

/// Execute the server action.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the database is
/// unreachable, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let tokens = Arc::new(args.token_maker()?);
    let storage = storage(args.dsn.as_deref()).await?;

    let engine = Engine::new(
        storage,
        Arc::new(LogEmailSender),
        tokens,
        args.engine_config(),
    )
    .context("Failed to build engine")?;

    info!(strategies = ?engine.enabled_strategies(), "engine ready");

    api::serve(args.port, Arc::new(engine), &args.frontend_base_url).await
}
