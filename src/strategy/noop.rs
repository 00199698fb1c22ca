//! Strategy that accepts everyone. Meant for tests and local wiring only.

use async_trait::async_trait;
use tracing::debug;

use super::{session_to_revoke, Strategy, StrategyKind, StrategyOutput};
use crate::error::Result;
use crate::exchange::Exchange;
use crate::session::SessionManager;

pub struct NoOpStrategy {
    sessions: SessionManager,
}

impl NoOpStrategy {
    #[must_use]
    pub fn new(sessions: SessionManager) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl Strategy for NoOpStrategy {
    fn configured_strategy(&self) -> StrategyKind {
        StrategyKind::NoOp
    }

    async fn register(&self, exchange: Exchange) -> Result<Exchange> {
        debug!("noop register");
        Ok(exchange.with_output(StrategyOutput::NoOp))
    }

    async fn authenticate(&self, exchange: Exchange) -> Result<Exchange> {
        debug!("noop authenticate");
        Ok(exchange.with_output(StrategyOutput::NoOp))
    }

    async fn revoke(&self, exchange: &Exchange) -> Result<()> {
        let id = session_to_revoke(exchange, StrategyKind::NoOp)?;
        self.sessions.block_session(id).await
    }
}
