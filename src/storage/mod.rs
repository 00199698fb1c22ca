//! Persistence boundary.
//!
//! Writes return the number of rows they touched so callers can tell a silent
//! no-op from a success. Unique violations surface as
//! [`Error::DuplicateEntry`](crate::Error::DuplicateEntry) and missing rows as
//! [`Error::NotFound`](crate::Error::NotFound).

mod memory;
mod postgres;

pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::Result;
use crate::session::Session;

pub const CREDENTIALS: &str = "credentials";
pub const PERSONAL_NUMBER: &str = "personal_number";
pub const VERIFICATION: &str = "verification";
pub const SESSION: &str = "session";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialsRecord {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub created_at: OffsetDateTime,
    pub verified_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersonalNumberRecord {
    pub number: u64,
    pub created_at: OffsetDateTime,
}

/// Pending out-of-band verification; only the token hash is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRecord {
    pub entity_id: Uuid,
    pub token_hash: Vec<u8>,
    pub expires_at: OffsetDateTime,
}

/// Outcome of [`Storage::confirm_verification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Verified,
    /// No unused, unexpired token matched.
    TokenUnavailable,
    /// The token matched but its credentials are gone; the token is left unused.
    CredentialsMissing,
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn insert_credentials(&self, record: &CredentialsRecord) -> Result<u64>;

    async fn read_credentials_by_email(&self, email: &str) -> Result<CredentialsRecord>;

    async fn insert_personal_number(&self, record: &PersonalNumberRecord) -> Result<u64>;

    async fn read_personal_number(&self, number: u64) -> Result<PersonalNumberRecord>;

    async fn insert_verification(&self, record: &VerificationRecord) -> Result<u64>;

    /// Consume an unexpired verification row and mark its credentials
    /// verified. Both writes land together or not at all.
    async fn confirm_verification(
        &self,
        entity_id: Uuid,
        token_hash: &[u8],
        now: OffsetDateTime,
    ) -> Result<Confirmation>;

    async fn create_session(&self, session: &Session) -> Result<u64>;

    async fn read_session(&self, id: Uuid) -> Result<Session>;

    /// Mark a session inactive; matches already blocked sessions too.
    async fn block_session(&self, id: Uuid) -> Result<u64>;

    async fn ping(&self) -> Result<()>;
}
