use async_trait::async_trait;
use std::collections::HashMap;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    Confirmation, CredentialsRecord, PersonalNumberRecord, Storage, VerificationRecord,
    CREDENTIALS, PERSONAL_NUMBER, SESSION,
};
use crate::error::{Error, Result};
use crate::session::Session;

#[derive(Debug, Default)]
struct Tables {
    credentials: HashMap<String, CredentialsRecord>,
    personal_numbers: HashMap<u64, PersonalNumberRecord>,
    verifications: Vec<(VerificationRecord, Option<OffsetDateTime>)>,
    sessions: HashMap<Uuid, Session>,
}

/// Process-local storage for development and tests.
///
/// Applies the same uniqueness rules as the Postgres schema.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: RwLock<Tables>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn insert_credentials(&self, record: &CredentialsRecord) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let duplicate = tables.credentials.contains_key(&record.email)
            || tables.credentials.values().any(|row| row.id == record.id);
        if duplicate {
            return Err(Error::DuplicateEntry {
                entity: CREDENTIALS,
            });
        }
        tables
            .credentials
            .insert(record.email.clone(), record.clone());
        Ok(1)
    }

    async fn read_credentials_by_email(&self, email: &str) -> Result<CredentialsRecord> {
        let tables = self.tables.read().await;
        tables
            .credentials
            .get(email)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                entity: CREDENTIALS,
                key: email.to_string(),
            })
    }

    async fn insert_personal_number(&self, record: &PersonalNumberRecord) -> Result<u64> {
        let mut tables = self.tables.write().await;
        if tables.personal_numbers.contains_key(&record.number) {
            return Err(Error::DuplicateEntry {
                entity: PERSONAL_NUMBER,
            });
        }
        tables.personal_numbers.insert(record.number, *record);
        Ok(1)
    }

    async fn read_personal_number(&self, number: u64) -> Result<PersonalNumberRecord> {
        let tables = self.tables.read().await;
        tables
            .personal_numbers
            .get(&number)
            .copied()
            .ok_or_else(|| Error::NotFound {
                entity: PERSONAL_NUMBER,
                key: number.to_string(),
            })
    }

    async fn insert_verification(&self, record: &VerificationRecord) -> Result<u64> {
        let mut tables = self.tables.write().await;
        tables.verifications.push((record.clone(), None));
        Ok(1)
    }

    async fn confirm_verification(
        &self,
        entity_id: Uuid,
        token_hash: &[u8],
        now: OffsetDateTime,
    ) -> Result<Confirmation> {
        // One write lock covers both tables.
        let mut tables = self.tables.write().await;
        let Tables {
            credentials,
            verifications,
            ..
        } = &mut *tables;

        let Some((_, consumed_at)) = verifications.iter_mut().find(|(record, consumed_at)| {
            record.entity_id == entity_id
                && record.token_hash == token_hash
                && record.expires_at > now
                && consumed_at.is_none()
        }) else {
            return Ok(Confirmation::TokenUnavailable);
        };
        let Some(row) = credentials.values_mut().find(|row| row.id == entity_id) else {
            return Ok(Confirmation::CredentialsMissing);
        };

        *consumed_at = Some(now);
        if row.verified_at.is_none() {
            row.verified_at = Some(now);
        }
        Ok(Confirmation::Verified)
    }

    async fn create_session(&self, session: &Session) -> Result<u64> {
        let mut tables = self.tables.write().await;
        if tables.sessions.contains_key(&session.id) {
            return Err(Error::DuplicateEntry { entity: SESSION });
        }
        tables.sessions.insert(session.id, session.clone());
        Ok(1)
    }

    async fn read_session(&self, id: Uuid) -> Result<Session> {
        let tables = self.tables.read().await;
        tables
            .sessions
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                entity: SESSION,
                key: id.to_string(),
            })
    }

    async fn block_session(&self, id: Uuid) -> Result<u64> {
        let mut tables = self.tables.write().await;
        Ok(tables.sessions.get_mut(&id).map_or(0, |session| {
            session.is_active = false;
            1
        }))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn credentials(email: &str) -> CredentialsRecord {
        CredentialsRecord {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: "$2b$04$hash".to_string(),
            created_at: OffsetDateTime::now_utc(),
            verified_at: None,
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() -> Result<()> {
        let storage = MemoryStorage::new();
        assert_eq!(storage.insert_credentials(&credentials("a@b.com")).await?, 1);
        let result = storage.insert_credentials(&credentials("a@b.com")).await;
        assert!(matches!(
            result,
            Err(Error::DuplicateEntry {
                entity: CREDENTIALS
            })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn missing_rows_are_not_found() {
        let storage = MemoryStorage::new();
        assert!(matches!(
            storage.read_credentials_by_email("x@y.z").await,
            Err(Error::NotFound { entity: CREDENTIALS, .. })
        ));
        assert!(matches!(
            storage.read_personal_number(42).await,
            Err(Error::NotFound {
                entity: PERSONAL_NUMBER,
                ..
            })
        ));
        assert!(matches!(
            storage.block_session(Uuid::new_v4()).await,
            Ok(0)
        ));
    }

    #[tokio::test]
    async fn verification_is_consumed_once() -> Result<()> {
        let storage = MemoryStorage::new();
        let now = OffsetDateTime::now_utc();
        let account = credentials("a@b.com");
        storage.insert_credentials(&account).await?;
        let record = VerificationRecord {
            entity_id: account.id,
            token_hash: vec![1, 2, 3],
            expires_at: now + Duration::minutes(30),
        };
        storage.insert_verification(&record).await?;

        assert_eq!(
            storage
                .confirm_verification(record.entity_id, &[1, 2, 3], now)
                .await?,
            Confirmation::Verified
        );
        assert_eq!(
            storage.read_credentials_by_email("a@b.com").await?.verified_at,
            Some(now)
        );
        assert_eq!(
            storage
                .confirm_verification(record.entity_id, &[1, 2, 3], now)
                .await?,
            Confirmation::TokenUnavailable
        );
        Ok(())
    }

    #[tokio::test]
    async fn expired_verification_is_not_consumed() -> Result<()> {
        let storage = MemoryStorage::new();
        let now = OffsetDateTime::now_utc();
        let account = credentials("a@b.com");
        storage.insert_credentials(&account).await?;
        let record = VerificationRecord {
            entity_id: account.id,
            token_hash: vec![9],
            expires_at: now - Duration::seconds(1),
        };
        storage.insert_verification(&record).await?;
        assert_eq!(
            storage.confirm_verification(record.entity_id, &[9], now).await?,
            Confirmation::TokenUnavailable
        );
        assert!(storage
            .read_credentials_by_email("a@b.com")
            .await?
            .verified_at
            .is_none());
        Ok(())
    }

    #[tokio::test]
    async fn token_survives_missing_credentials() -> Result<()> {
        let storage = MemoryStorage::new();
        let now = OffsetDateTime::now_utc();
        let account = credentials("a@b.com");
        let record = VerificationRecord {
            entity_id: account.id,
            token_hash: vec![4, 2],
            expires_at: now + Duration::minutes(30),
        };
        storage.insert_verification(&record).await?;

        assert_eq!(
            storage.confirm_verification(account.id, &[4, 2], now).await?,
            Confirmation::CredentialsMissing
        );

        // Once the account exists the same token still works.
        storage.insert_credentials(&account).await?;
        assert_eq!(
            storage.confirm_verification(account.id, &[4, 2], now).await?,
            Confirmation::Verified
        );
        Ok(())
    }
}
