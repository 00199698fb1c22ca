//! Server-generated 16-digit personal numbers.

use async_trait::async_trait;
use rand::{rngs::OsRng, Rng};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, instrument};

use super::{
    session_to_revoke, PersonalNumberInput, PersonalNumberOutput, Strategy, StrategyDeps,
    StrategyKind, StrategyOutput,
};
use crate::error::{expect_one_row, Error, Result};
use crate::exchange::Exchange;
use crate::session::SessionManager;
use crate::storage::{PersonalNumberRecord, Storage};

const LOWEST: u64 = 1_000_000_000_000_000;
const HIGHEST: u64 = 9_999_999_999_999_999;

/// Random 16-digit number from the OS CSPRNG.
#[must_use]
pub fn generate_personal_number() -> u64 {
    OsRng.gen_range(LOWEST..=HIGHEST)
}

pub struct PersonalNumberStrategy {
    storage: Arc<dyn Storage>,
    sessions: SessionManager,
}

impl PersonalNumberStrategy {
    #[must_use]
    pub fn new(deps: StrategyDeps) -> Self {
        Self {
            storage: deps.storage,
            sessions: deps.sessions,
        }
    }
}

#[async_trait]
impl Strategy for PersonalNumberStrategy {
    fn configured_strategy(&self) -> StrategyKind {
        StrategyKind::PersonalNumber
    }

    /// A collision surfaces as `DuplicateEntry`; retrying is the caller's call.
    #[instrument(skip_all, fields(strategy = %StrategyKind::PersonalNumber))]
    async fn register(&self, exchange: Exchange) -> Result<Exchange> {
        if exchange.read_input::<PersonalNumberInput>()?.number.is_some() {
            return Err(Error::Input(
                "personal numbers are generated, not chosen".to_string(),
            ));
        }

        let record = PersonalNumberRecord {
            number: generate_personal_number(),
            created_at: OffsetDateTime::now_utc(),
        };
        expect_one_row(self.storage.insert_personal_number(&record).await?)?;
        debug!("personal number stored");

        Ok(
            exchange.with_output(StrategyOutput::PersonalNumber(PersonalNumberOutput {
                number: record.number,
            })),
        )
    }

    #[instrument(skip_all, fields(strategy = %StrategyKind::PersonalNumber))]
    async fn authenticate(&self, exchange: Exchange) -> Result<Exchange> {
        let number = exchange
            .read_input::<PersonalNumberInput>()?
            .number
            .ok_or_else(|| Error::Input("missing personal number".to_string()))?;

        // No secondary proof exists; the number only has to be registered.
        let record = self.storage.read_personal_number(number).await?;

        Ok(
            exchange.with_output(StrategyOutput::PersonalNumber(PersonalNumberOutput {
                number: record.number,
            })),
        )
    }

    async fn revoke(&self, exchange: &Exchange) -> Result<()> {
        let id = session_to_revoke(exchange, StrategyKind::PersonalNumber)?;
        self.sessions.block_session(id).await
    }
}
