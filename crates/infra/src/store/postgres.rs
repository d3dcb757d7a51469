//! Postgres-backed credential store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (other) | Any other | `Backend` |
//! | PoolTimedOut | N/A | `Timeout` |
//! | Other | N/A | `Backend` |
//!
//! Tokens and password hashes are never recorded on spans.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::instrument;

use folio_auth::{Role, Session, SessionId, User, UserId};

use super::{CredentialStore, SessionLookup, StoreError};

const MIGRATION: &str = include_str!("../../migrations/0001_auth.sql");

#[derive(Debug, Clone)]
pub struct PostgresCredentialStore {
    pool: Arc<PgPool>,
}

impl PostgresCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the schema. Idempotent.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(MIGRATION)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

const USER_COLUMNS: &str =
    "id, email, name, password_hash, role, is_active, last_login_at, created_at, updated_at";

fn user_from_row(row: &PgRow, prefix: &str) -> Result<User, sqlx::Error> {
    let col = |name: &str| format!("{prefix}{name}");
    let role: String = row.try_get(col("role").as_str())?;
    let role = role.parse::<Role>().map_err(|e| sqlx::Error::ColumnDecode {
        index: col("role"),
        source: Box::new(e),
    })?;

    Ok(User {
        id: UserId::from_uuid(row.try_get(col("id").as_str())?),
        email: row.try_get(col("email").as_str())?,
        name: row.try_get(col("name").as_str())?,
        password_hash: row.try_get(col("password_hash").as_str())?,
        role,
        is_active: row.try_get(col("is_active").as_str())?,
        last_login_at: row.try_get(col("last_login_at").as_str())?,
        created_at: row.try_get(col("created_at").as_str())?,
        updated_at: row.try_get(col("updated_at").as_str())?,
    })
}

fn session_from_row(row: &PgRow) -> Result<Session, sqlx::Error> {
    Ok(Session {
        id: SessionId::from_uuid(row.try_get("session_id")?),
        token: row.try_get("token")?,
        user_id: UserId::from_uuid(row.try_get("session_user_id")?),
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("session_created_at")?,
    })
}

fn decode_error(operation: &str, err: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("failed to decode row in {operation}: {err}"))
}

#[async_trait]
impl CredentialStore for PostgresCredentialStore {
    #[instrument(skip_all, fields(user_id = %user.id, role = %user.role), err)]
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, password_hash, role, is_active, last_login_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .bind(user.last_login_at)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;
        Ok(())
    }

    #[instrument(skip_all, err)]
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_user_by_email", e))?;

        row.map(|r| user_from_row(&r, ""))
            .transpose()
            .map_err(|e| decode_error("find_user_by_email", e))
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn find_user_by_id(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(user_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_user_by_id", e))?;

        row.map(|r| user_from_row(&r, ""))
            .transpose()
            .map_err(|e| decode_error("find_user_by_id", e))
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn record_login(&self, user_id: UserId, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_login_at = $2 WHERE id = $1")
            .bind(user_id.as_uuid())
            .bind(at)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("record_login", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn set_user_active(
        &self,
        user_id: UserId,
        active: bool,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE users SET is_active = $2, updated_at = $3 WHERE id = $1")
            .bind(user_id.as_uuid())
            .bind(active)
            .bind(at)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("set_user_active", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, password_hash), fields(user_id = %user_id), err)]
    async fn replace_password_hash(
        &self,
        user_id: UserId,
        password_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<u64>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("replace_password_hash", e))?;

        let updated = sqlx::query("UPDATE users SET password_hash = $2, updated_at = $3 WHERE id = $1")
            .bind(user_id.as_uuid())
            .bind(password_hash)
            .bind(at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("replace_password_hash", e))?
            .rows_affected();

        if updated == 0 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("replace_password_hash", e))?;
            return Ok(None);
        }

        let revoked = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("replace_password_hash", e))?
            .rows_affected();

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("replace_password_hash", e))?;
        Ok(Some(revoked))
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn delete_user(&self, user_id: UserId) -> Result<bool, StoreError> {
        // Sessions go with the user via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_user", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip_all, fields(session_id = %session.id, user_id = %session.user_id), err)]
    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, token, user_id, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(session.id.as_uuid())
        .bind(&session.token)
        .bind(session.user_id.as_uuid())
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_session", e))?;
        Ok(())
    }

    #[instrument(skip_all, err)]
    async fn find_session(&self, token: &str) -> Result<Option<SessionLookup>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                s.id          AS session_id,
                s.token       AS token,
                s.user_id     AS session_user_id,
                s.expires_at  AS expires_at,
                s.created_at  AS session_created_at,
                u.id            AS u_id,
                u.email         AS u_email,
                u.name          AS u_name,
                u.password_hash AS u_password_hash,
                u.role          AS u_role,
                u.is_active     AS u_is_active,
                u.last_login_at AS u_last_login_at,
                u.created_at    AS u_created_at,
                u.updated_at    AS u_updated_at
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_session", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let session = session_from_row(&row).map_err(|e| decode_error("find_session", e))?;
        let owner = user_from_row(&row, "u_").map_err(|e| decode_error("find_session", e))?;
        Ok(Some(SessionLookup { session, owner }))
    }

    #[instrument(skip_all, err)]
    async fn delete_session(&self, token: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_session", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn delete_sessions_for_user(&self, user_id: UserId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_sessions_for_user", e))?;
        Ok(result.rows_affected())
    }
}

/// Map SQLx errors to `StoreError` with operation context.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut => StoreError::Timeout {
            operation: "acquire_connection",
        },
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
