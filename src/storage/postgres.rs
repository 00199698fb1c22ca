use async_trait::async_trait;
use sqlx::{postgres::PgRow, Connection, PgPool, Row};
use time::OffsetDateTime;
use tracing::{info_span, Instrument, Span};
use uuid::Uuid;

use super::{
    Confirmation, CredentialsRecord, PersonalNumberRecord, Storage, VerificationRecord,
    CREDENTIALS, PERSONAL_NUMBER, SESSION, VERIFICATION,
};
use crate::error::{expect_one_row, Error, Result};
use crate::session::Session;
use crate::token::SafeString;

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

/// Postgres-backed storage.
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if they do not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if any schema statement fails.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .instrument(info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "DDL"
            ))
            .await
            .map_err(|err| Error::storage("ensure_schema", err))?;
        Ok(())
    }
}

fn query_span(operation: &'static str, statement: &'static str) -> Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn to_bigint(number: u64) -> Result<i64> {
    i64::try_from(number).map_err(|_| Error::Input(format!("number out of range: {number}")))
}

fn map_write_error(err: sqlx::Error, operation: &'static str, entity: &'static str) -> Error {
    if is_unique_violation(&err) {
        Error::DuplicateEntry { entity }
    } else {
        Error::storage(operation, err)
    }
}

fn credentials_from_row(row: &PgRow) -> Result<CredentialsRecord> {
    let decode = |err| Error::storage("read_credentials_by_email", err);
    Ok(CredentialsRecord {
        id: row.try_get("id").map_err(decode)?,
        email: row.try_get("email").map_err(decode)?,
        password_hash: row.try_get("password_hash").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        verified_at: row.try_get("verified_at").map_err(decode)?,
    })
}

fn session_from_row(row: &PgRow) -> Result<Session> {
    let decode = |err| Error::storage("read_session", err);
    let refresh_token: String = row.try_get("refresh_token").map_err(decode)?;
    Ok(Session {
        id: row.try_get("id").map_err(decode)?,
        owner: row.try_get("owner").map_err(decode)?,
        client_ip: row.try_get("client_ip").map_err(decode)?,
        user_agent: row.try_get("user_agent").map_err(decode)?,
        refresh_token: SafeString::new(refresh_token),
        is_active: row.try_get("is_active").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        expires_at: row.try_get("expires_at").map_err(decode)?,
    })
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn insert_credentials(&self, record: &CredentialsRecord) -> Result<u64> {
        let query = r"
            INSERT INTO credentials (id, email, password_hash, created_at)
            VALUES ($1, $2, $3, $4)
        ";
        let result = sqlx::query(query)
            .bind(record.id)
            .bind(&record.email)
            .bind(&record.password_hash)
            .bind(record.created_at)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .map_err(|err| map_write_error(err, "insert_credentials", CREDENTIALS))?;
        Ok(result.rows_affected())
    }

    async fn read_credentials_by_email(&self, email: &str) -> Result<CredentialsRecord> {
        let query = r"
            SELECT id, email, password_hash, created_at, verified_at
            FROM credentials
            WHERE email = $1
        ";
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .map_err(|err| Error::storage("read_credentials_by_email", err))?
            .ok_or_else(|| Error::NotFound {
                entity: CREDENTIALS,
                key: email.to_string(),
            })?;
        credentials_from_row(&row)
    }

    async fn insert_personal_number(&self, record: &PersonalNumberRecord) -> Result<u64> {
        let query = "INSERT INTO personal_numbers (id, created_at) VALUES ($1, $2)";
        let result = sqlx::query(query)
            .bind(to_bigint(record.number)?)
            .bind(record.created_at)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .map_err(|err| map_write_error(err, "insert_personal_number", PERSONAL_NUMBER))?;
        Ok(result.rows_affected())
    }

    async fn read_personal_number(&self, number: u64) -> Result<PersonalNumberRecord> {
        let query = "SELECT id, created_at FROM personal_numbers WHERE id = $1";
        let row = sqlx::query(query)
            .bind(to_bigint(number)?)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .map_err(|err| Error::storage("read_personal_number", err))?
            .ok_or_else(|| Error::NotFound {
                entity: PERSONAL_NUMBER,
                key: number.to_string(),
            })?;
        let decode = |err| Error::storage("read_personal_number", err);
        let id: i64 = row.try_get("id").map_err(decode)?;
        Ok(PersonalNumberRecord {
            number: u64::try_from(id)
                .map_err(|err| Error::storage("read_personal_number", err))?,
            created_at: row.try_get("created_at").map_err(decode)?,
        })
    }

    async fn insert_verification(&self, record: &VerificationRecord) -> Result<u64> {
        let query = r"
            INSERT INTO verification_tokens (entity_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
        ";
        let result = sqlx::query(query)
            .bind(record.entity_id)
            .bind(&record.token_hash)
            .bind(record.expires_at)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .map_err(|err| map_write_error(err, "insert_verification", VERIFICATION))?;
        Ok(result.rows_affected())
    }

    async fn confirm_verification(
        &self,
        entity_id: Uuid,
        token_hash: &[u8],
        now: OffsetDateTime,
    ) -> Result<Confirmation> {
        let fail = |err| Error::storage("confirm_verification", err);

        // Dropping the transaction without commit rolls both writes back.
        let mut tx = self.pool.begin().await.map_err(fail)?;

        let consume = r"
            UPDATE verification_tokens
            SET consumed_at = $3
            WHERE entity_id = $1
              AND token_hash = $2
              AND consumed_at IS NULL
              AND expires_at > $3
        ";
        let consumed = sqlx::query(consume)
            .bind(entity_id)
            .bind(token_hash)
            .bind(now)
            .execute(&mut *tx)
            .instrument(query_span("UPDATE", consume))
            .await
            .map_err(fail)?
            .rows_affected();
        if consumed == 0 {
            return Ok(Confirmation::TokenUnavailable);
        }
        expect_one_row(consumed)?;

        let mark = "UPDATE credentials SET verified_at = COALESCE(verified_at, $2) WHERE id = $1";
        let marked = sqlx::query(mark)
            .bind(entity_id)
            .bind(now)
            .execute(&mut *tx)
            .instrument(query_span("UPDATE", mark))
            .await
            .map_err(fail)?
            .rows_affected();
        if marked == 0 {
            return Ok(Confirmation::CredentialsMissing);
        }
        expect_one_row(marked)?;

        tx.commit().await.map_err(fail)?;
        Ok(Confirmation::Verified)
    }

    async fn create_session(&self, session: &Session) -> Result<u64> {
        let query = r"
            INSERT INTO sessions
                (id, owner, client_ip, user_agent, refresh_token, is_active, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ";
        let result = sqlx::query(query)
            .bind(session.id)
            .bind(&session.owner)
            .bind(&session.client_ip)
            .bind(&session.user_agent)
            .bind(session.refresh_token.expose())
            .bind(session.is_active)
            .bind(session.created_at)
            .bind(session.expires_at)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await
            .map_err(|err| map_write_error(err, "create_session", SESSION))?;
        Ok(result.rows_affected())
    }

    async fn read_session(&self, id: Uuid) -> Result<Session> {
        let query = r"
            SELECT id, owner, client_ip, user_agent, refresh_token, is_active, created_at, expires_at
            FROM sessions
            WHERE id = $1
        ";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .map_err(|err| Error::storage("read_session", err))?
            .ok_or_else(|| Error::NotFound {
                entity: SESSION,
                key: id.to_string(),
            })?;
        session_from_row(&row)
    }

    async fn block_session(&self, id: Uuid) -> Result<u64> {
        let query = "UPDATE sessions SET is_active = FALSE WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .map_err(|err| Error::storage("block_session", err))?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self
            .pool
            .acquire()
            .instrument(info_span!(
                "db.acquire",
                db.system = "postgresql",
                db.operation = "ACQUIRE"
            ))
            .await
            .map_err(|err| Error::storage("ping", err))?;
        conn.ping()
            .instrument(info_span!(
                "db.ping",
                db.system = "postgresql",
                db.operation = "PING"
            ))
            .await
            .map_err(|err| Error::storage("ping", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bigint_conversion_checks_range() {
        assert!(matches!(to_bigint(4_865_998_752_658_465), Ok(4_865_998_752_658_465)));
        assert!(matches!(to_bigint(u64::MAX), Err(Error::Input(_))));
    }

    #[test]
    fn schema_defines_every_table() {
        for table in [
            "credentials",
            "personal_numbers",
            "verification_tokens",
            "sessions",
        ] {
            assert!(
                SCHEMA_SQL.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")),
                "missing table {table}"
            );
        }
    }

    #[test]
    fn non_database_errors_are_not_unique_violations() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
        assert!(matches!(
            map_write_error(sqlx::Error::RowNotFound, "insert_credentials", CREDENTIALS),
            Error::Storage {
                operation: "insert_credentials",
                ..
            }
        ));
    }
}
