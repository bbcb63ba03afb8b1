//! In-process stores.
//!
//! Same contracts as the Postgres adapters: email uniqueness on insert, whole
//! record replacement for sessions. Nothing survives a restart.

use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    CredentialStore, InsertOutcome, NewUser, SessionRecord, SessionStore, StoreFuture, User,
};
use crate::auth::identity::{Email, Role, Username};

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    users: RwLock<Vec<User>>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn find_by_email<'a>(&'a self, email: &'a Email) -> StoreFuture<'a, Option<User>> {
        Box::pin(async move {
            let users = self.users.read().await;
            Ok(users
                .iter()
                .find(|user| user.email == email.as_str())
                .cloned())
        })
    }

    fn find_by_username<'a>(&'a self, username: &'a Username) -> StoreFuture<'a, Vec<User>> {
        Box::pin(async move {
            let users = self.users.read().await;
            Ok(users
                .iter()
                .filter(|user| user.username == username.as_str())
                .cloned()
                .collect())
        })
    }

    fn insert(&self, user: NewUser) -> StoreFuture<'_, InsertOutcome> {
        Box::pin(async move {
            let mut users = self.users.write().await;
            if users
                .iter()
                .any(|existing| existing.email == user.email.as_str())
            {
                return Ok(InsertOutcome::Conflict);
            }
            let created = User {
                id: Uuid::new_v4(),
                username: user.username.as_str().to_string(),
                email: user.email.as_str().to_string(),
                password_hash: user.password_hash,
                role: user.role,
            };
            users.push(created.clone());
            Ok(InsertOutcome::Created(created))
        })
    }

    fn update_role<'a>(&'a self, username: &'a Username, role: Role) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let mut users = self.users.write().await;
            // Only the first match, like a single-document update.
            match users
                .iter_mut()
                .find(|user| user.username == username.as_str())
            {
                Some(user) => {
                    user.role = role;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    fn list_all(&self) -> StoreFuture<'_, Vec<User>> {
        Box::pin(async move { Ok(self.users.read().await.clone()) })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<Vec<u8>, SessionRecord>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn get<'a>(&'a self, key: &'a [u8]) -> StoreFuture<'a, Option<SessionRecord>> {
        Box::pin(async move { Ok(self.sessions.read().await.get(key).cloned()) })
    }

    fn set<'a>(&'a self, key: &'a [u8], record: SessionRecord) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.sessions.write().await.insert(key.to_vec(), record);
            Ok(())
        })
    }

    fn destroy<'a>(&'a self, key: &'a [u8]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.sessions.write().await.remove(key);
            Ok(())
        })
    }

    fn purge_expired(&self, now: i64) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let mut sessions = self.sessions.write().await;
            let before = sessions.len();
            sessions.retain(|_, record| record.expires_at > now);
            Ok(u64::try_from(before - sessions.len()).unwrap_or(u64::MAX))
        })
    }
}
