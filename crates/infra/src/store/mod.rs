//! Credential store: the single source of truth for users and refresh sessions.
//!
//! Nothing above this layer caches session validity; every check reads through.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use folio_auth::{Session, User, UserId};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryCredentialStore;
pub use postgres::PostgresCredentialStore;

/// Credential store operation error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint was hit (email or session token).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The call did not finish within its bound. Safe to retry.
    #[error("store operation '{operation}' timed out")]
    Timeout { operation: &'static str },

    #[error("storage error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether the caller may retry the same operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Timeout { .. })
    }
}

/// A session row joined with its owning user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLookup {
    pub session: Session,
    pub owner: User,
}

/// Persistence contract for users and refresh sessions.
///
/// Implementations must provide atomic single-row reads and writes, and the
/// multi-row operations documented below must be atomic as a whole.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a new user. Duplicate email → [`StoreError::Conflict`].
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_id(&self, user_id: UserId) -> Result<Option<User>, StoreError>;

    /// Stamp `last_login_at`. Missing users are ignored.
    async fn record_login(&self, user_id: UserId, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Returns `false` if the user does not exist.
    async fn set_user_active(
        &self,
        user_id: UserId,
        active: bool,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Atomically replace the password hash and delete every session of the user.
    ///
    /// Returns the number of sessions deleted, or `None` if the user does not exist.
    async fn replace_password_hash(
        &self,
        user_id: UserId,
        password_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<u64>, StoreError>;

    /// Atomically delete a user together with all of its sessions.
    async fn delete_user(&self, user_id: UserId) -> Result<bool, StoreError>;

    /// Insert a session. Duplicate token → [`StoreError::Conflict`].
    async fn insert_session(&self, session: &Session) -> Result<(), StoreError>;

    async fn find_session(&self, token: &str) -> Result<Option<SessionLookup>, StoreError>;

    /// Delete-if-exists. Returns whether a row was removed.
    async fn delete_session(&self, token: &str) -> Result<bool, StoreError>;

    async fn delete_sessions_for_user(&self, user_id: UserId) -> Result<u64, StoreError>;
}

#[async_trait]
impl<S> CredentialStore for Arc<S>
where
    S: CredentialStore + ?Sized,
{
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        (**self).insert_user(user).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        (**self).find_user_by_email(email).await
    }

    async fn find_user_by_id(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        (**self).find_user_by_id(user_id).await
    }

    async fn record_login(&self, user_id: UserId, at: DateTime<Utc>) -> Result<(), StoreError> {
        (**self).record_login(user_id, at).await
    }

    async fn set_user_active(
        &self,
        user_id: UserId,
        active: bool,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        (**self).set_user_active(user_id, active, at).await
    }

    async fn replace_password_hash(
        &self,
        user_id: UserId,
        password_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<u64>, StoreError> {
        (**self).replace_password_hash(user_id, password_hash, at).await
    }

    async fn delete_user(&self, user_id: UserId) -> Result<bool, StoreError> {
        (**self).delete_user(user_id).await
    }

    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        (**self).insert_session(session).await
    }

    async fn find_session(&self, token: &str) -> Result<Option<SessionLookup>, StoreError> {
        (**self).find_session(token).await
    }

    async fn delete_session(&self, token: &str) -> Result<bool, StoreError> {
        (**self).delete_session(token).await
    }

    async fn delete_sessions_for_user(&self, user_id: UserId) -> Result<u64, StoreError> {
        (**self).delete_sessions_for_user(user_id).await
    }
}

/// Run a store future under a deadline.
///
/// On expiry the future is dropped and [`StoreError::Timeout`] is returned.
pub async fn bounded<T, F>(limit: Duration, operation: &'static str, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                operation,
                timeout_ms = limit.as_millis() as u64,
                "credential store call timed out"
            );
            Err(StoreError::Timeout { operation })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounded_passes_through_fast_results() {
        let out = bounded(Duration::from_millis(50), "fast", async { Ok::<_, StoreError>(7) }).await;
        assert_eq!(out, Ok(7));
    }

    #[tokio::test]
    async fn bounded_maps_elapsed_to_transient_timeout() {
        let out: Result<(), StoreError> = bounded(Duration::from_millis(10), "slow", async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;

        let err = out.unwrap_err();
        assert_eq!(err, StoreError::Timeout { operation: "slow" });
        assert!(err.is_transient());
        assert!(!StoreError::Conflict("x".into()).is_transient());
    }
}
