//! External stores for credentials and sessions.
//!
//! The auth core never talks to a database directly; it goes through
//! [`CredentialStore`] and [`SessionStore`]. Credential operations only take
//! [`Username`] / [`Email`], which can only be built from validated input.
//!
//! Adapters:
//! - [`postgres`]: sqlx-backed, used in production.
//! - [`memory`]: process-local maps, used by tests and `--memory-store`.
//!
//! Adapters must not retry writes: a blind retry of an insert could create the
//! same user twice.

use anyhow::Result;
use std::{future::Future, pin::Pin};
use uuid::Uuid;

use crate::auth::identity::{Email, Role, Username};

pub mod memory;
pub mod postgres;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Stored user record.
#[derive(Clone, Eq, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password_hash", &"***")
            .field("role", &self.role)
            .finish()
    }
}

/// Fields for a user that does not exist yet.
#[derive(Clone)]
pub struct NewUser {
    pub username: Username,
    pub email: Email,
    pub password_hash: String,
    pub role: Role,
}

/// Outcome when attempting to create a user.
#[derive(Debug)]
pub enum InsertOutcome {
    Created(User),
    /// Another user already holds this email.
    Conflict,
}

pub trait CredentialStore: Send + Sync {
    fn find_by_email<'a>(&'a self, email: &'a Email) -> StoreFuture<'a, Option<User>>;

    /// Usernames are not unique, so this may return several records.
    fn find_by_username<'a>(&'a self, username: &'a Username) -> StoreFuture<'a, Vec<User>>;

    fn insert(&self, user: NewUser) -> StoreFuture<'_, InsertOutcome>;

    /// Returns whether any user matched.
    fn update_role<'a>(&'a self, username: &'a Username, role: Role) -> StoreFuture<'a, bool>;

    fn list_all(&self) -> StoreFuture<'_, Vec<User>>;

    /// Cheap reachability check used by `/health`.
    fn ping(&self) -> StoreFuture<'_, ()>;
}

/// Persisted session state, keyed by a digest of the client's token.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SessionRecord {
    pub authenticated: bool,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub created_at: i64,
    pub expires_at: i64,
}

/// Whole-record session persistence; every `set` replaces the stored record.
pub trait SessionStore: Send + Sync {
    fn get<'a>(&'a self, key: &'a [u8]) -> StoreFuture<'a, Option<SessionRecord>>;

    fn set<'a>(&'a self, key: &'a [u8], record: SessionRecord) -> StoreFuture<'a, ()>;

    /// Idempotent: deleting a missing key is not an error.
    fn destroy<'a>(&'a self, key: &'a [u8]) -> StoreFuture<'a, ()>;

    /// Delete records with `expires_at <= now`; returns how many were removed.
    fn purge_expired(&self, now: i64) -> StoreFuture<'_, u64>;
}
