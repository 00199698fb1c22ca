//! Refresh-token-backed sessions.
//!
//! A session is created once per successful authentication and can only move
//! from active to blocked. Nothing here deletes sessions.

use std::fmt;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{expect_one_row, Error, Result};
use crate::storage::{Storage, SESSION};
use crate::token::SafeString;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Equal to the refresh token's claim id.
    pub id: Uuid,
    pub owner: String,
    pub client_ip: String,
    pub user_agent: String,
    pub refresh_token: SafeString,
    pub is_active: bool,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: Uuid,
    pub owner: String,
    pub client_ip: String,
    pub user_agent: String,
    pub refresh_token: SafeString,
    pub expires_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct SessionManager {
    storage: Arc<dyn Storage>,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager").finish_non_exhaustive()
    }
}

impl SessionManager {
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Persist a new active session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateEntry`] if the id is taken, or
    /// [`Error::UnexpectedRowsAffected`] if the insert did not write one row.
    #[instrument(skip(self, new), fields(session_id = %new.id))]
    pub async fn create_session(&self, new: NewSession) -> Result<Session> {
        let session = Session {
            id: new.id,
            owner: new.owner,
            client_ip: new.client_ip,
            user_agent: new.user_agent,
            refresh_token: new.refresh_token,
            is_active: true,
            created_at: OffsetDateTime::now_utc(),
            expires_at: new.expires_at,
        };
        expect_one_row(self.storage.create_session(&session).await?)?;
        debug!("session created");
        Ok(session)
    }

    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no session has this id.
    pub async fn read_session(&self, id: Uuid) -> Result<Session> {
        self.storage.read_session(id).await
    }

    /// Block a session. Blocking an already blocked session succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no session has this id.
    #[instrument(skip(self))]
    pub async fn block_session(&self, id: Uuid) -> Result<()> {
        match self.storage.block_session(id).await? {
            0 => Err(Error::NotFound {
                entity: SESSION,
                key: id.to_string(),
            }),
            rows => {
                expect_one_row(rows)?;
                debug!("session blocked");
                Ok(())
            }
        }
    }
}
