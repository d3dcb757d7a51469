//! Refresh-session lifecycle.
//!
//! A session is live while its row exists and `expires_at` has not passed.
//! Expired rows are deleted lazily, the next time someone tries to resolve
//! them; there is no background sweep.

use std::time::Duration;

use chrono::Utc;
use rand::RngCore;
use rand::rngs::OsRng;
use thiserror::Error;

use folio_auth::{Session, SessionId, User, UserId};

use crate::store::{CredentialStore, StoreError, bounded};

/// Random bytes per refresh token (hex-encoded to twice this length).
pub const SESSION_TOKEN_BYTES: usize = 32;

/// Default session lifetime.
pub const DEFAULT_SESSION_TTL_DAYS: i64 = 7;

const TOKEN_ATTEMPTS: usize = 3;

/// Why a session could not be resolved. For logs and tests only; callers
/// facing clients must not reveal it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRejection {
    Unknown,
    Expired,
    OwnerInactive,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("invalid session")]
    InvalidSession(SessionRejection),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A live session together with its (active) owner.
#[derive(Debug, Clone)]
pub struct ResolvedSession {
    pub session_id: SessionId,
    pub owner: User,
}

impl ResolvedSession {
    pub fn user_id(&self) -> UserId {
        self.owner.id
    }
}

pub struct SessionManager<S> {
    store: S,
    ttl: chrono::Duration,
    store_timeout: Duration,
}

impl<S> SessionManager<S>
where
    S: CredentialStore,
{
    pub fn new(store: S, ttl: chrono::Duration, store_timeout: Duration) -> Self {
        Self {
            store,
            ttl,
            store_timeout,
        }
    }

    /// Persist a new session for `user_id` and return it. Existing sessions
    /// of the user are left alone.
    pub async fn create_session(&self, user_id: UserId) -> Result<Session, SessionError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let now = Utc::now();
            let session = Session {
                id: SessionId::new(),
                token: generate_session_token(),
                user_id,
                expires_at: now + self.ttl,
                created_at: now,
            };

            match bounded(
                self.store_timeout,
                "insert_session",
                self.store.insert_session(&session),
            )
            .await
            {
                Ok(()) => {
                    tracing::debug!(session_id = %session.id, user_id = %user_id, "session created");
                    return Ok(session);
                }
                Err(StoreError::Conflict(_)) if attempt < TOKEN_ATTEMPTS => {
                    tracing::warn!(user_id = %user_id, attempt, "session token collision; regenerating");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Look up a session by token.
    ///
    /// Expired rows are deleted before failing. Rows whose owner is inactive
    /// are kept: the user, not the session, is what is invalid, and
    /// reactivation should restore them without a new password login.
    pub async fn resolve_session(&self, token: &str) -> Result<ResolvedSession, SessionError> {
        let lookup = bounded(self.store_timeout, "find_session", self.store.find_session(token))
            .await?
            .ok_or(SessionError::InvalidSession(SessionRejection::Unknown))?;

        let now = Utc::now();
        if lookup.session.is_expired_at(now) {
            // Delete-if-exists: a concurrent resolver may have removed it already.
            bounded(self.store_timeout, "delete_session", self.store.delete_session(token)).await?;
            tracing::debug!(session_id = %lookup.session.id, "expired session removed");
            return Err(SessionError::InvalidSession(SessionRejection::Expired));
        }

        if !lookup.owner.is_active {
            return Err(SessionError::InvalidSession(SessionRejection::OwnerInactive));
        }

        Ok(ResolvedSession {
            session_id: lookup.session.id,
            owner: lookup.owner,
        })
    }

    /// Idempotent: unknown tokens are not an error.
    pub async fn delete_session(&self, token: &str) -> Result<bool, SessionError> {
        Ok(bounded(self.store_timeout, "delete_session", self.store.delete_session(token)).await?)
    }

    /// Idempotent; returns how many sessions were removed.
    pub async fn delete_all_sessions_for_user(&self, user_id: UserId) -> Result<u64, SessionError> {
        Ok(bounded(
            self.store_timeout,
            "delete_sessions_for_user",
            self.store.delete_sessions_for_user(user_id),
        )
        .await?)
    }
}

/// Opaque refresh token: CSPRNG bytes, hex-encoded.
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use chrono::Duration as ChronoDuration;
    use folio_auth::Role;

    use super::*;
    use crate::store::InMemoryCredentialStore;

    async fn setup() -> (Arc<InMemoryCredentialStore>, SessionManager<Arc<InMemoryCredentialStore>>, User) {
        let store = Arc::new(InMemoryCredentialStore::new());
        let now = Utc::now();
        let user = User {
            id: UserId::new(),
            email: "editor@x.com".into(),
            name: "Editor".into(),
            password_hash: "unused".into(),
            role: Role::Editor,
            is_active: true,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        store.insert_user(&user).await.unwrap();
        let manager = SessionManager::new(
            store.clone(),
            ChronoDuration::days(DEFAULT_SESSION_TTL_DAYS),
            Duration::from_secs(1),
        );
        (store, manager, user)
    }

    #[test]
    fn tokens_are_long_random_hex() {
        let tokens: HashSet<String> = (0..64).map(|_| generate_session_token()).collect();
        assert_eq!(tokens.len(), 64);
        assert!(tokens.iter().all(|t| t.len() == 64 && t.chars().all(|c| c.is_ascii_hexdigit())));
    }

    #[tokio::test]
    async fn created_session_expires_after_ttl_and_resolves() {
        let (_store, manager, user) = setup().await;
        let before = Utc::now();

        let session = manager.create_session(user.id).await.unwrap();
        assert!(session.expires_at >= before + ChronoDuration::days(7));
        assert!(session.expires_at <= Utc::now() + ChronoDuration::days(7));

        let resolved = manager.resolve_session(&session.token).await.unwrap();
        assert_eq!(resolved.user_id(), user.id);
        assert_eq!(resolved.session_id, session.id);
    }

    #[tokio::test]
    async fn unknown_token_is_rejected() {
        let (_store, manager, _user) = setup().await;
        let err = manager.resolve_session("nope").await.unwrap_err();
        assert_eq!(err, SessionError::InvalidSession(SessionRejection::Unknown));
    }

    #[tokio::test]
    async fn expired_session_is_deleted_on_resolution() {
        let (store, manager, user) = setup().await;
        let now = Utc::now();
        let stale = Session {
            id: SessionId::new(),
            token: generate_session_token(),
            user_id: user.id,
            expires_at: now - ChronoDuration::seconds(1),
            created_at: now - ChronoDuration::days(7),
        };
        store.insert_session(&stale).await.unwrap();

        let err = manager.resolve_session(&stale.token).await.unwrap_err();
        assert_eq!(err, SessionError::InvalidSession(SessionRejection::Expired));
        assert!(store.find_session(&stale.token).await.unwrap().is_none());

        let err = manager.resolve_session(&stale.token).await.unwrap_err();
        assert_eq!(err, SessionError::InvalidSession(SessionRejection::Unknown));
    }

    #[tokio::test]
    async fn inactive_owner_fails_but_keeps_the_row() {
        let (store, manager, user) = setup().await;
        let session = manager.create_session(user.id).await.unwrap();
        store.set_user_active(user.id, false, Utc::now()).await.unwrap();

        let err = manager.resolve_session(&session.token).await.unwrap_err();
        assert_eq!(err, SessionError::InvalidSession(SessionRejection::OwnerInactive));
        assert!(store.find_session(&session.token).await.unwrap().is_some());

        store.set_user_active(user.id, true, Utc::now()).await.unwrap();
        assert!(manager.resolve_session(&session.token).await.is_ok());
    }

    #[tokio::test]
    async fn deletes_are_idempotent() {
        let (_store, manager, user) = setup().await;
        let a = manager.create_session(user.id).await.unwrap();
        manager.create_session(user.id).await.unwrap();

        assert!(manager.delete_session(&a.token).await.unwrap());
        assert!(!manager.delete_session(&a.token).await.unwrap());
        assert_eq!(manager.delete_all_sessions_for_user(user.id).await.unwrap(), 1);
        assert_eq!(manager.delete_all_sessions_for_user(user.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn slow_store_surfaces_transient_timeout() {
        let store = Arc::new(InMemoryCredentialStore::with_latency(Duration::from_millis(200)));
        let manager = SessionManager::new(store, ChronoDuration::days(7), Duration::from_millis(10));

        let err = manager.resolve_session("anything").await.unwrap_err();
        assert_eq!(
            err,
            SessionError::Store(StoreError::Timeout {
                operation: "find_session"
            })
        );
    }
}
