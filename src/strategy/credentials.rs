//! Email + password strategy.

use async_trait::async_trait;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::OnceCell;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use super::{
    session_to_revoke, CredentialsInput, CredentialsOutput, Strategy, StrategyDeps, StrategyKind,
    StrategyOutput,
};
use crate::email::{build_verify_url, verification_message, EmailSender};
use crate::engine::EngineConfig;
use crate::error::{expect_one_row, Error, Result};
use crate::exchange::Exchange;
use crate::password::{
    normalize_email, spawn_hash_password, spawn_verify_password, valid_email, validate_password,
};
use crate::session::SessionManager;
use crate::storage::{CredentialsRecord, Storage, VerificationRecord};
use crate::verification::new_verification_token;

/// Hashed once per strategy and checked against when the email is unknown.
const DUMMY_PASSWORD: &str = "tessera-unknown-account";

pub struct CredentialsStrategy {
    storage: Arc<dyn Storage>,
    email: Arc<dyn EmailSender>,
    sessions: SessionManager,
    config: EngineConfig,
    dummy_hash: OnceCell<String>,
}

impl CredentialsStrategy {
    #[must_use]
    pub fn new(deps: StrategyDeps) -> Self {
        Self {
            storage: deps.storage,
            email: deps.email,
            sessions: deps.sessions,
            config: deps.config,
            dummy_hash: OnceCell::new(),
        }
    }

    /// Hash at the configured cost so unknown emails cost as much as known ones.
    async fn dummy_hash(&self) -> Result<&str> {
        let hash = self
            .dummy_hash
            .get_or_try_init(|| {
                spawn_hash_password(DUMMY_PASSWORD.into(), self.config.bcrypt_cost())
            })
            .await?;
        Ok(hash)
    }

    /// Persist a verification token and mail the link; failures are only logged.
    async fn send_verification(&self, record: &CredentialsRecord) {
        let token = new_verification_token(record.id);
        let verification = VerificationRecord {
            entity_id: record.id,
            token_hash: token.hash(),
            expires_at: OffsetDateTime::now_utc() + self.config.verification_ttl(),
        };
        match self.storage.insert_verification(&verification).await {
            Ok(1) => {}
            Ok(rows) => {
                error!(rows, "verification token insert touched unexpected rows");
                return;
            }
            Err(err) => {
                error!("Failed to store verification token: {err}");
                return;
            }
        }

        let verify_url = match build_verify_url(self.config.frontend_base_url(), &token) {
            Ok(url) => url,
            Err(err) => {
                error!("Failed to build verification link: {err}");
                return;
            }
        };
        let message = verification_message(&record.email, self.config.email_from(), &verify_url);
        if let Err(err) = self.email.send(&message) {
            warn!("Failed to send verification email: {err}");
        }
    }
}

#[async_trait]
impl Strategy for CredentialsStrategy {
    fn configured_strategy(&self) -> StrategyKind {
        StrategyKind::Credentials
    }

    #[instrument(skip_all, fields(strategy = %StrategyKind::Credentials))]
    async fn register(&self, exchange: Exchange) -> Result<Exchange> {
        let CredentialsInput { email, password } = exchange.read_input::<CredentialsInput>()?;

        validate_password(password.expose())?;
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(Error::Input("invalid email".to_string()));
        }

        let password_hash =
            spawn_hash_password(password.clone(), self.config.bcrypt_cost()).await?;
        let record = CredentialsRecord {
            id: Uuid::new_v4(),
            email,
            password_hash,
            created_at: OffsetDateTime::now_utc(),
            verified_at: None,
        };
        expect_one_row(self.storage.insert_credentials(&record).await?)?;
        debug!(credentials_id = %record.id, "credentials stored");

        // The row is committed at this point; notification never rolls it back.
        self.send_verification(&record).await;

        Ok(
            exchange.with_output(StrategyOutput::Credentials(CredentialsOutput {
                email: record.email,
            })),
        )
    }

    #[instrument(skip_all, fields(strategy = %StrategyKind::Credentials))]
    async fn authenticate(&self, exchange: Exchange) -> Result<Exchange> {
        let CredentialsInput { email, password } = exchange.read_input::<CredentialsInput>()?;
        let email = normalize_email(email);

        let record = match self.storage.read_credentials_by_email(&email).await {
            Ok(record) => Some(record),
            Err(Error::NotFound { .. }) => None,
            Err(err) => return Err(err),
        };

        // Unknown emails still pay for a full verify.
        let hash = match &record {
            Some(record) => record.password_hash.clone(),
            None => self.dummy_hash().await?.to_string(),
        };
        let matched = spawn_verify_password(password.clone(), hash).await?;
        let record = match record {
            Some(record) if matched => record,
            _ => return Err(Error::InvalidCredentials),
        };

        Ok(
            exchange.with_output(StrategyOutput::Credentials(CredentialsOutput {
                email: record.email,
            })),
        )
    }

    async fn revoke(&self, exchange: &Exchange) -> Result<()> {
        let id = session_to_revoke(exchange, StrategyKind::Credentials)?;
        self.sessions.block_session(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::EmailMessage;
    use crate::password::verify_password;
    use crate::storage::MemoryStorage;
    use crate::strategy::StrategyInput;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<EmailMessage>>,
    }

    impl EmailSender for RecordingSender {
        fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
            self.sent
                .lock()
                .map_err(|_| anyhow::anyhow!("poisoned"))?
                .push(message.clone());
            Ok(())
        }
    }

    struct FailingSender;

    impl EmailSender for FailingSender {
        fn send(&self, _message: &EmailMessage) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("smtp unavailable"))
        }
    }

    fn strategy(
        storage: Arc<MemoryStorage>,
        email: Arc<dyn EmailSender>,
    ) -> CredentialsStrategy {
        CredentialsStrategy::new(StrategyDeps {
            sessions: SessionManager::new(storage.clone()),
            storage,
            email,
            config: EngineConfig::default().with_bcrypt_cost(4),
        })
    }

    fn input(email: &str, password: &str) -> Exchange {
        Exchange::new().with_input(StrategyInput::Credentials(CredentialsInput {
            email: email.to_string(),
            password: password.into(),
        }))
    }

    #[tokio::test]
    async fn register_stores_hash_and_rejects_duplicates() -> Result<()> {
        let storage = Arc::new(MemoryStorage::new());
        let sender = Arc::new(RecordingSender::default());
        let strategy = strategy(storage.clone(), sender.clone());

        let exchange = strategy.register(input("a@b.com", "Passw0rd")).await?;
        assert_eq!(exchange.read_output::<CredentialsOutput>()?.email, "a@b.com");

        let stored = storage.read_credentials_by_email("a@b.com").await?;
        assert_ne!(stored.password_hash, "Passw0rd");
        assert!(verify_password("Passw0rd", &stored.password_hash)?);

        let sent = sender.sent.lock().map(|sent| sent.clone()).unwrap_or_default();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "a@b.com");
        assert!(sent[0].body.contains(&stored.id.to_string()));

        let result = strategy.register(input("a@b.com", "Passw0rd")).await;
        assert!(matches!(
            result,
            Err(Error::DuplicateEntry {
                entity: "credentials"
            })
        ));
        let sent = sender.sent.lock().map(|sent| sent.len()).unwrap_or_default();
        assert_eq!(sent, 1, "rejected registration must not send mail");
        Ok(())
    }

    #[tokio::test]
    async fn register_normalizes_email() -> Result<()> {
        let storage = Arc::new(MemoryStorage::new());
        let strategy = strategy(storage.clone(), Arc::new(RecordingSender::default()));
        let exchange = strategy.register(input("  A@B.com ", "Passw0rd")).await?;
        assert_eq!(exchange.read_output::<CredentialsOutput>()?.email, "a@b.com");
        Ok(())
    }

    #[tokio::test]
    async fn email_failure_does_not_fail_registration() -> Result<()> {
        let storage = Arc::new(MemoryStorage::new());
        let strategy = strategy(storage.clone(), Arc::new(FailingSender));
        strategy.register(input("a@b.com", "Passw0rd")).await?;
        assert!(storage.read_credentials_by_email("a@b.com").await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn register_validates_input() {
        let strategy = strategy(
            Arc::new(MemoryStorage::new()),
            Arc::new(RecordingSender::default()),
        );
        for (email, password) in [("a@b.com", "short"), ("not-an-email", "Passw0rd")] {
            let result = strategy.register(input(email, password)).await;
            assert!(matches!(result, Err(Error::Input(_))), "{email} accepted");
        }
    }

    #[tokio::test]
    async fn missing_input_is_reported() {
        let strategy = strategy(
            Arc::new(MemoryStorage::new()),
            Arc::new(RecordingSender::default()),
        );
        let exchange =
            Exchange::new().with_input(StrategyInput::PersonalNumber(Default::default()));
        let result = strategy.register(exchange).await;
        assert!(matches!(
            result,
            Err(Error::NotInExchange {
                kind: StrategyKind::Credentials,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn authenticate_checks_password() -> Result<()> {
        let storage = Arc::new(MemoryStorage::new());
        let strategy = strategy(storage, Arc::new(RecordingSender::default()));
        strategy.register(input("a@b.com", "Passw0rd")).await?;

        let exchange = strategy.authenticate(input("A@b.com", "Passw0rd")).await?;
        assert_eq!(exchange.read_output::<CredentialsOutput>()?.email, "a@b.com");

        let wrong = strategy.authenticate(input("a@b.com", "Passw0rD")).await;
        assert!(matches!(wrong, Err(Error::InvalidCredentials)));

        let unknown = strategy.authenticate(input("x@b.com", "Passw0rd")).await;
        assert!(matches!(unknown, Err(Error::InvalidCredentials)));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_email_is_checked_against_dummy_hash() -> Result<()> {
        let storage = Arc::new(MemoryStorage::new());
        let strategy = strategy(storage, Arc::new(RecordingSender::default()));
        strategy.register(input("a@b.com", "Passw0rd")).await?;

        let wrong = strategy.authenticate(input("a@b.com", "Passw0rD")).await;
        assert!(matches!(wrong, Err(Error::InvalidCredentials)));
        assert!(!strategy.dummy_hash.initialized());

        let unknown = strategy.authenticate(input("x@b.com", "Passw0rd")).await;
        assert!(matches!(unknown, Err(Error::InvalidCredentials)));
        let dummy = strategy
            .dummy_hash
            .get()
            .ok_or_else(|| Error::Input("unknown email skipped bcrypt".to_string()))?;
        assert!(dummy.starts_with("$2b$04$"));
        assert!(verify_password(DUMMY_PASSWORD, dummy)?);

        // The dummy password never unlocks an account that does not exist.
        let dummy_login = strategy.authenticate(input("x@b.com", DUMMY_PASSWORD)).await;
        assert!(matches!(dummy_login, Err(Error::InvalidCredentials)));
        Ok(())
    }

    #[tokio::test]
    async fn revoke_requires_session() {
        let strategy = strategy(
            Arc::new(MemoryStorage::new()),
            Arc::new(RecordingSender::default()),
        );
        assert!(matches!(
            strategy.revoke(&Exchange::new()).await,
            Err(Error::NotInExchange { .. })
        ));
        assert!(matches!(
            strategy
                .revoke(&Exchange::new().with_session(Uuid::new_v4()))
                .await,
            Err(Error::NotFound { .. })
        ));
    }
}
