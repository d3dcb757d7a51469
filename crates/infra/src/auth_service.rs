//! Login → refresh → logout orchestration.
//!
//! Session state is never stored explicitly. It is derived at read time:
//! - ACTIVE: row exists, unexpired, owner active
//! - EXPIRED: row exists past its TTL; deleted on the next resolution attempt
//! - REVOKED: row deleted by logout / logout-all / password reset / user deletion
//!
//! Refresh tokens are not rotated on use. A session keeps minting access
//! tokens until its original `expires_at`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

use folio_auth::{
    PasswordHasher, PublicUser, Role, TokenSigner, TokenSubject, User, UserId,
    authorize_target,
};
use tokio::sync::OnceCell;

use crate::sessions::{DEFAULT_SESSION_TTL_DAYS, SessionError, SessionManager, generate_session_token};
use crate::store::{CredentialStore, StoreError, bounded};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Login failed. Unknown email, inactive account and wrong password all
    /// produce this same value.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// Refresh failed: unknown, expired or revoked session, or inactive owner.
    #[error("invalid or expired refresh token")]
    InvalidOrExpiredRefreshToken,

    #[error("user not found")]
    NotFound,

    /// The acting principal may not administer the target account.
    #[error("forbidden")]
    Forbidden,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    /// Hashing, signing or task failures. Details are logged, not returned.
    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Only store timeouts are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::Store(e) if e.is_transient())
    }
}

/// Tunables for [`AuthService`].
#[derive(Debug, Clone, Copy)]
pub struct AuthSettings {
    pub session_ttl: chrono::Duration,
    /// Upper bound on each credential store call.
    pub store_timeout: Duration,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            session_ttl: chrono::Duration::days(DEFAULT_SESSION_TTL_DAYS),
            store_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access-token lifetime in seconds.
    pub expires_in: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginOutcome {
    pub user: PublicUser,
    pub tokens: TokenPair,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessGrant {
    pub access_token: String,
    pub expires_in: i64,
}

/// Input for creating an account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password: String,
    pub role: Role,
    pub is_active: bool,
}

pub struct AuthService<S> {
    store: S,
    sessions: SessionManager<S>,
    signer: Arc<TokenSigner>,
    hasher: PasswordHasher,
    store_timeout: Duration,
    /// Hash checked when login has no real hash to compare against, so every
    /// failure costs one Argon2 verification.
    decoy_hash: OnceCell<String>,
}

impl<S> AuthService<S>
where
    S: CredentialStore + Clone,
{
    pub fn new(store: S, signer: Arc<TokenSigner>, hasher: PasswordHasher, settings: AuthSettings) -> Self {
        Self {
            sessions: SessionManager::new(store.clone(), settings.session_ttl, settings.store_timeout),
            store,
            signer,
            hasher,
            store_timeout: settings.store_timeout,
            decoy_hash: OnceCell::new(),
        }
    }

    pub fn signer(&self) -> &Arc<TokenSigner> {
        &self.signer
    }


    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let email = normalize_email(email);
        let user = bounded(
            self.store_timeout,
            "find_user_by_email",
            self.store.find_user_by_email(email),
        )
        .await?;

        let mut user = match user {
            Some(user) if user.is_active => user,
            Some(user) => {
                self.verify_decoy(password).await?;
                tracing::info!(user_id = %user.id, reason = "inactive", "login rejected");
                return Err(AuthError::InvalidCredentials);
            }
            None => {
                self.verify_decoy(password).await?;
                tracing::info!(reason = "unknown_email", "login rejected");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !self.verify_password(password, &user.password_hash).await? {
            tracing::info!(user_id = %user.id, reason = "bad_password", "login rejected");
            return Err(AuthError::InvalidCredentials);
        }

        let access = self.issue_access_token(&user)?;
        let session = self.sessions.create_session(user.id).await.map_err(session_failure)?;

        let now = Utc::now();
        bounded(self.store_timeout, "record_login", self.store.record_login(user.id, now)).await?;
        user.last_login_at = Some(now);

        tracing::info!(user_id = %user.id, session_id = %session.id, role = %user.role, "login succeeded");
        Ok(LoginOutcome {
            user: user.to_public(),
            tokens: TokenPair {
                access_token: access.token,
                refresh_token: session.token,
                expires_in: access.expires_in,
            },
        })
    }

    /// Mint a new access token from a live session. The session itself is
    /// neither rotated nor extended.
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<AccessGrant, AuthError> {
        let resolved = match self.sessions.resolve_session(refresh_token).await {
            Ok(resolved) => resolved,
            Err(SessionError::InvalidSession(reason)) => {
                tracing::info!(?reason, "refresh rejected");
                return Err(AuthError::InvalidOrExpiredRefreshToken);
            }
            Err(SessionError::Store(e)) => return Err(e.into()),
        };

        let access = self.issue_access_token(&resolved.owner)?;
        tracing::debug!(user_id = %resolved.owner.id, session_id = %resolved.session_id, "access token refreshed");
        Ok(AccessGrant {
            access_token: access.token,
            expires_in: access.expires_in,
        })
    }

    /// Best-effort: always succeeds from the caller's point of view.
    pub async fn logout(&self, refresh_token: &str) {
        match self.sessions.delete_session(refresh_token).await {
            Ok(true) => tracing::debug!("session revoked by logout"),
            Ok(false) => tracing::debug!("logout for unknown session ignored"),
            Err(e) => tracing::warn!(error = %e, "logout failed; ignoring"),
        }
    }

    /// Revoke every session of `user_id`. Already-issued access tokens stay
    /// valid until they expire.
    pub async fn logout_all(&self, user_id: UserId) -> Result<u64, AuthError> {
        let revoked = self
            .sessions
            .delete_all_sessions_for_user(user_id)
            .await
            .map_err(session_failure)?;
        tracing::info!(user_id = %user_id, revoked, "all sessions revoked");
        Ok(revoked)
    }

    pub async fn get_current_user(&self, user_id: UserId) -> Result<PublicUser, AuthError> {
        bounded(self.store_timeout, "find_user_by_id", self.store.find_user_by_id(user_id))
            .await?
            .map(|u| u.to_public())
            .ok_or(AuthError::NotFound)
    }

    pub async fn register_user(&self, new_user: NewUser) -> Result<PublicUser, AuthError> {
        let email = normalize_email(&new_user.email).to_string();
        if email.is_empty() {
            return Err(AuthError::Validation("email must not be empty".into()));
        }
        if new_user.password.is_empty() {
            return Err(AuthError::Validation("password must not be empty".into()));
        }

        let password_hash = self.hash_password(new_user.password).await?;
        let now = Utc::now();
        let user = User {
            id: UserId::new(),
            email,
            name: new_user.name,
            password_hash,
            role: new_user.role,
            is_active: new_user.is_active,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };

        match bounded(self.store_timeout, "insert_user", self.store.insert_user(&user)).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => {
                return Err(AuthError::Conflict("email already registered".into()));
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(user_id = %user.id, role = %user.role, "user registered");
        Ok(user.to_public())
    }

    /// Replace the password and revoke all of the user's sessions in one
    /// atomic store operation. Returns the number of sessions revoked.
    pub async fn reset_password(&self, user_id: UserId, new_password: String) -> Result<u64, AuthError> {
        if new_password.is_empty() {
            return Err(AuthError::Validation("password must not be empty".into()));
        }

        let password_hash = self.hash_password(new_password).await?;
        let revoked = bounded(
            self.store_timeout,
            "replace_password_hash",
            self.store.replace_password_hash(user_id, &password_hash, Utc::now()),
        )
        .await?
        .ok_or(AuthError::NotFound)?;

        tracing::info!(user_id = %user_id, revoked, "password reset; sessions revoked");
        Ok(revoked)
    }

    /// Activate or deactivate an account. Deactivation also revokes every
    /// session; returns the number revoked.
    pub async fn set_user_active(&self, user_id: UserId, active: bool) -> Result<u64, AuthError> {
        let found = bounded(
            self.store_timeout,
            "set_user_active",
            self.store.set_user_active(user_id, active, Utc::now()),
        )
        .await?;
        if !found {
            return Err(AuthError::NotFound);
        }

        tracing::info!(user_id = %user_id, active, "user activation changed");
        if active {
            Ok(0)
        } else {
            self.logout_all(user_id).await
        }
    }

    pub async fn delete_user(&self, user_id: UserId) -> Result<(), AuthError> {
        let deleted = bounded(self.store_timeout, "delete_user", self.store.delete_user(user_id)).await?;
        if !deleted {
            return Err(AuthError::NotFound);
        }
        tracing::info!(user_id = %user_id, "user deleted with all sessions");
        Ok(())
    }

    /// Create a `SUPER_ADMIN` with `email` unless that email already exists.
    /// Returns whether an account was created.
    pub async fn ensure_bootstrap_admin(&self, email: &str, password: &str) -> Result<bool, AuthError> {
        let existing = bounded(
            self.store_timeout,
            "find_user_by_email",
            self.store.find_user_by_email(normalize_email(email)),
        )
        .await?;
        if existing.is_some() {
            return Ok(false);
        }

        let created = self
            .register_user(NewUser {
                email: email.to_string(),
                name: "Administrator".to_string(),
                password: password.to_string(),
                role: Role::SuperAdmin,
                is_active: true,
            })
            .await;

        match created {
            Ok(_) => Ok(true),
            // Another instance seeded it first.
            Err(AuthError::Conflict(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Load `target` and check that `actor` may administer it. Admin
    /// operations call this before acting.
    pub async fn authorize_management(&self, actor: Role, target: UserId) -> Result<PublicUser, AuthError> {
        let user = self.get_current_user(target).await?;
        authorize_target(actor, user.role).map_err(|_| {
            tracing::info!(actor_role = %actor, target = %target, target_role = %user.role, "management refused");
            AuthError::Forbidden
        })?;
        Ok(user)
    }

    fn issue_access_token(&self, user: &User) -> Result<folio_auth::IssuedToken, AuthError> {
        let subject = TokenSubject {
            user_id: user.id,
            email: user.email.clone(),
            role: user.role,
        };
        self.signer
            .issue(&subject, Utc::now())
            .map_err(|e| AuthError::Internal(e.to_string()))
    }

    /// Argon2 is CPU-bound; keep it off the async workers.
    async fn verify_password(&self, plaintext: &str, hash: &str) -> Result<bool, AuthError> {
        let hasher = self.hasher.clone();
        let plaintext = plaintext.to_owned();
        let hash = hash.to_owned();
        tokio::task::spawn_blocking(move || hasher.verify(&plaintext, &hash))
            .await
            .map_err(|e| AuthError::Internal(format!("password verification task failed: {e}")))
    }

    async fn verify_decoy(&self, plaintext: &str) -> Result<(), AuthError> {
        let hash = self
            .decoy_hash
            .get_or_try_init(|| self.hash_password(generate_session_token()))
            .await?;
        self.verify_password(plaintext, hash).await?;
        Ok(())
    }

    async fn hash_password(&self, plaintext: String) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
            .await
            .map_err(|e| AuthError::Internal(format!("password hashing task failed: {e}")))?
            .map_err(|e| AuthError::Internal(e.to_string()))
    }
}

/// Emails are compared exactly after trimming surrounding whitespace, both
/// when stored and when looked up.
fn normalize_email(email: &str) -> &str {
    email.trim()
}

fn session_failure(err: SessionError) -> AuthError {
    match err {
        SessionError::Store(e) => AuthError::Store(e),
        SessionError::InvalidSession(_) => AuthError::InvalidOrExpiredRefreshToken,
    }
}
