use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use folio_auth::{Session, User, UserId};

use super::{CredentialStore, SessionLookup, StoreError};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    sessions: HashMap<String, Session>,
}

/// In-memory credential store for tests/dev.
///
/// Both tables sit behind one lock, so the multi-row operations are atomic.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    inner: RwLock<Tables>,
    latency: Option<Duration>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a network round-trip before every operation.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            inner: RwLock::new(Tables::default()),
            latency: Some(latency),
        }
    }

    pub fn session_count(&self) -> usize {
        self.inner.read().map(|t| t.sessions.len()).unwrap_or(0)
    }

    async fn round_trip(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend("credential store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("credential store lock poisoned".into()))
    }
}

fn remove_sessions_of(tables: &mut Tables, user_id: UserId) -> u64 {
    let before = tables.sessions.len();
    tables.sessions.retain(|_, s| s.user_id != user_id);
    (before - tables.sessions.len()) as u64
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        self.round_trip().await;
        let mut tables = self.write()?;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict(format!("email '{}' already exists", user.email)));
        }
        if tables.users.contains_key(&user.id) {
            return Err(StoreError::Conflict(format!("user {} already exists", user.id)));
        }
        tables.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.round_trip().await;
        let tables = self.read()?;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        self.round_trip().await;
        Ok(self.read()?.users.get(&user_id).cloned())
    }

    async fn record_login(&self, user_id: UserId, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.round_trip().await;
        if let Some(user) = self.write()?.users.get_mut(&user_id) {
            user.last_login_at = Some(at);
        }
        Ok(())
    }

    async fn set_user_active(
        &self,
        user_id: UserId,
        active: bool,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.round_trip().await;
        match self.write()?.users.get_mut(&user_id) {
            Some(user) => {
                user.is_active = active;
                user.updated_at = at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn replace_password_hash(
        &self,
        user_id: UserId,
        password_hash: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<u64>, StoreError> {
        self.round_trip().await;
        let mut tables = self.write()?;
        let Some(user) = tables.users.get_mut(&user_id) else {
            return Ok(None);
        };
        user.password_hash = password_hash.to_string();
        user.updated_at = at;
        Ok(Some(remove_sessions_of(&mut tables, user_id)))
    }

    async fn delete_user(&self, user_id: UserId) -> Result<bool, StoreError> {
        self.round_trip().await;
        let mut tables = self.write()?;
        if tables.users.remove(&user_id).is_none() {
            return Ok(false);
        }
        remove_sessions_of(&mut tables, user_id);
        Ok(true)
    }

    async fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        self.round_trip().await;
        let mut tables = self.write()?;
        if tables.sessions.contains_key(&session.token) {
            return Err(StoreError::Conflict("session token already exists".into()));
        }
        if !tables.users.contains_key(&session.user_id) {
            return Err(StoreError::Backend(format!(
                "session references unknown user {}",
                session.user_id
            )));
        }
        tables.sessions.insert(session.token.clone(), session.clone());
        Ok(())
    }

    async fn find_session(&self, token: &str) -> Result<Option<SessionLookup>, StoreError> {
        self.round_trip().await;
        let tables = self.read()?;
        let lookup = tables.sessions.get(token).and_then(|session| {
            tables.users.get(&session.user_id).map(|owner| SessionLookup {
                session: session.clone(),
                owner: owner.clone(),
            })
        });
        Ok(lookup)
    }

    async fn delete_session(&self, token: &str) -> Result<bool, StoreError> {
        self.round_trip().await;
        Ok(self.write()?.sessions.remove(token).is_some())
    }

    async fn delete_sessions_for_user(&self, user_id: UserId) -> Result<u64, StoreError> {
        self.round_trip().await;
        Ok(remove_sessions_of(&mut *self.write()?, user_id))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;
    use folio_auth::{Role, SessionId};

    use super::*;

    fn user(email: &str) -> User {
        let now = Utc::now();
        User {
            id: UserId::new(),
            email: email.into(),
            name: "Test".into(),
            password_hash: "hash".into(),
            role: Role::Viewer,
            is_active: true,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn session(user_id: UserId, token: &str) -> Session {
        let now = Utc::now();
        Session {
            id: SessionId::new(),
            token: token.into(),
            user_id,
            expires_at: now + ChronoDuration::days(7),
            created_at: now,
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let store = InMemoryCredentialStore::new();
        store.insert_user(&user("a@x.com")).await.unwrap();

        let err = store.insert_user(&user("a@x.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // Emails are stored and matched exactly.
        store.insert_user(&user("A@x.com")).await.unwrap();
        assert!(store.find_user_by_email("a@X.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn password_replacement_revokes_only_that_users_sessions() {
        let store = InMemoryCredentialStore::new();
        let alice = user("alice@x.com");
        let bob = user("bob@x.com");
        store.insert_user(&alice).await.unwrap();
        store.insert_user(&bob).await.unwrap();
        store.insert_session(&session(alice.id, "a1")).await.unwrap();
        store.insert_session(&session(alice.id, "a2")).await.unwrap();
        store.insert_session(&session(bob.id, "b1")).await.unwrap();

        let revoked = store
            .replace_password_hash(alice.id, "new-hash", Utc::now())
            .await
            .unwrap();

        assert_eq!(revoked, Some(2));
        assert_eq!(store.session_count(), 1);
        assert_eq!(
            store.find_user_by_id(alice.id).await.unwrap().unwrap().password_hash,
            "new-hash"
        );
        assert_eq!(
            store.replace_password_hash(UserId::new(), "h", Utc::now()).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn deleting_a_user_cascades_to_sessions() {
        let store = InMemoryCredentialStore::new();
        let alice = user("alice@x.com");
        store.insert_user(&alice).await.unwrap();
        store.insert_session(&session(alice.id, "a1")).await.unwrap();

        assert!(store.delete_user(alice.id).await.unwrap());
        assert!(store.find_session("a1").await.unwrap().is_none());
        assert!(!store.delete_user(alice.id).await.unwrap());
    }

    #[tokio::test]
    async fn session_delete_is_idempotent() {
        let store = InMemoryCredentialStore::new();
        let alice = user("alice@x.com");
        store.insert_user(&alice).await.unwrap();
        store.insert_session(&session(alice.id, "a1")).await.unwrap();

        assert!(store.delete_session("a1").await.unwrap());
        assert!(!store.delete_session("a1").await.unwrap());
        assert!(!store.delete_session("never-existed").await.unwrap());
    }

    #[tokio::test]
    async fn session_lookup_carries_owner_state() {
        let store = InMemoryCredentialStore::new();
        let alice = user("alice@x.com");
        store.insert_user(&alice).await.unwrap();
        store.insert_session(&session(alice.id, "a1")).await.unwrap();
        store.set_user_active(alice.id, false, Utc::now()).await.unwrap();

        let lookup = store.find_session("a1").await.unwrap().unwrap();
        assert_eq!(lookup.owner.id, alice.id);
        assert!(!lookup.owner.is_active);
    }
}
