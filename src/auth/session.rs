//! Server-side sessions.
//!
//! The client only ever holds an opaque random token. The store is keyed by
//! `SHA-256(secret || token)`, so a leaked session table cannot be replayed
//! as cookies. A session is valid while `now < expires_at`; expired records
//! are deleted the first time they are presented and by the sweeper.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::sleep;
use tracing::{debug, error, info};

use super::identity::Identity;
use crate::store::{SessionRecord, SessionStore};

/// Seconds since the Unix epoch.
#[must_use]
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
}

/// Session state as seen by a request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SessionState {
    Anonymous,
    Authenticated(Identity),
}

impl SessionState {
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(identity) => Some(identity),
        }
    }
}

/// A freshly issued session; `token` goes into the cookie and nowhere else.
#[derive(Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: i64,
}

impl std::fmt::Debug for IssuedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedSession")
            .field("token", &"***")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

fn generate_session_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    ttl_seconds: i64,
    secret: SecretString,
}

impl SessionManager {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, ttl_seconds: i64, secret: SecretString) -> Self {
        Self {
            store,
            ttl_seconds,
            secret,
        }
    }

    #[must_use]
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    fn digest(&self, token: &str) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.expose_secret().as_bytes());
        hasher.update(token.as_bytes());
        hasher.finalize().to_vec()
    }

    /// Issue a new authenticated session, retiring `previous` if one was presented.
    ///
    /// # Errors
    /// Returns an error if token generation or the session store fails.
    pub async fn issue(&self, identity: &Identity, previous: Option<&str>) -> Result<IssuedSession> {
        self.issue_at(identity, previous, unix_now()).await
    }

    /// [`Self::issue`] with an explicit clock.
    ///
    /// # Errors
    /// Returns an error if token generation or the session store fails.
    pub async fn issue_at(
        &self,
        identity: &Identity,
        previous: Option<&str>,
        now: i64,
    ) -> Result<IssuedSession> {
        if let Some(previous) = previous {
            self.store
                .destroy(&self.digest(previous))
                .await
                .context("failed to retire previous session")?;
        }

        let token = generate_session_token()?;
        let expires_at = now.saturating_add(self.ttl_seconds);
        let record = SessionRecord {
            authenticated: true,
            username: identity.username().to_string(),
            email: identity.email().to_string(),
            role: identity.role(),
            created_at: now,
            expires_at,
        };
        self.store
            .set(&self.digest(&token), record)
            .await
            .context("failed to store session")?;

        debug!(username = identity.username(), "Issued session");
        Ok(IssuedSession { token, expires_at })
    }

    /// Resolve a presented token to a session state.
    ///
    /// # Errors
    /// Returns an error only when the session store fails.
    pub async fn validate(&self, token: Option<&str>) -> Result<SessionState> {
        self.validate_at(token, unix_now()).await
    }

    /// [`Self::validate`] with an explicit clock.
    ///
    /// # Errors
    /// Returns an error only when the session store fails.
    pub async fn validate_at(&self, token: Option<&str>, now: i64) -> Result<SessionState> {
        let Some(token) = token.filter(|token| !token.is_empty()) else {
            return Ok(SessionState::Anonymous);
        };
        let key = self.digest(token);
        let Some(record) = self
            .store
            .get(&key)
            .await
            .context("failed to load session")?
        else {
            return Ok(SessionState::Anonymous);
        };

        if now >= record.expires_at {
            self.store
                .destroy(&key)
                .await
                .context("failed to delete expired session")?;
            return Ok(SessionState::Anonymous);
        }
        if !record.authenticated {
            return Ok(SessionState::Anonymous);
        }

        Ok(Identity::from_parts(record.username, record.email, record.role)
            .map_or(SessionState::Anonymous, SessionState::Authenticated))
    }

    /// Delete the session behind `token`. Unknown or absent tokens are fine.
    ///
    /// # Errors
    /// Returns an error if the session store fails.
    pub async fn destroy(&self, token: Option<&str>) -> Result<()> {
        if let Some(token) = token.filter(|token| !token.is_empty()) {
            self.store
                .destroy(&self.digest(token))
                .await
                .context("failed to delete session")?;
        }
        Ok(())
    }

    /// Remove every session that has expired as of `now`.
    ///
    /// # Errors
    /// Returns an error if the session store fails.
    pub async fn purge_expired_at(&self, now: i64) -> Result<u64> {
        self.store
            .purge_expired(now)
            .await
            .context("failed to purge expired sessions")
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("ttl_seconds", &self.ttl_seconds)
            .field("secret", &"***")
            .finish_non_exhaustive()
    }
}

/// Spawn a background task that periodically deletes expired sessions.
pub fn spawn_session_sweeper(
    sessions: SessionManager,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            sleep(interval).await;
            match sessions.purge_expired_at(unix_now()).await {
                Ok(0) => {}
                Ok(purged) => info!(purged, "Purged expired sessions"),
                Err(err) => error!("session sweep failed: {err:#}"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::identity::{Email, Role, Username};
    use crate::store::memory::MemorySessionStore;

    const T0: i64 = 1_700_000_000;

    fn identity(role: Role) -> Result<Identity> {
        Ok(Identity::new(
            Username::parse("alice")?,
            Email::parse("a@example.com")?,
            role,
        ))
    }

    fn manager(store: Arc<MemorySessionStore>) -> SessionManager {
        SessionManager::new(store, 3600, SecretString::from("test-secret".to_string()))
    }

    #[test]
    fn tokens_are_random_and_url_safe() -> Result<()> {
        let first = generate_session_token()?;
        let second = generate_session_token()?;
        assert_ne!(first, second);
        assert_eq!(first.len(), 43);
        assert!(first
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        Ok(())
    }

    #[test]
    fn digest_depends_on_secret() {
        let store = Arc::new(MemorySessionStore::new());
        let first = manager(store.clone());
        let other = SessionManager::new(store, 3600, SecretString::from("other".to_string()));
        assert_eq!(first.digest("token"), first.digest("token"));
        assert_ne!(first.digest("token"), other.digest("token"));
        assert_ne!(first.digest("token"), first.digest("token2"));
    }

    #[tokio::test]
    async fn issued_session_validates_until_ttl() -> Result<()> {
        let sessions = manager(Arc::new(MemorySessionStore::new()));
        let identity = identity(Role::User)?;
        let issued = sessions.issue_at(&identity, None, T0).await?;
        assert_eq!(issued.expires_at, T0 + 3600);

        let state = sessions.validate_at(Some(&issued.token), T0 + 3599).await?;
        assert_eq!(state, SessionState::Authenticated(identity));
        Ok(())
    }

    #[tokio::test]
    async fn session_expires_exactly_at_ttl() -> Result<()> {
        let store = Arc::new(MemorySessionStore::new());
        let sessions = manager(store.clone());
        let issued = sessions.issue_at(&identity(Role::User)?, None, T0).await?;

        let state = sessions.validate_at(Some(&issued.token), T0 + 3600).await?;
        assert_eq!(state, SessionState::Anonymous);
        // Expired record is removed on first sight.
        assert!(store.is_empty().await);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_or_missing_tokens_are_anonymous() -> Result<()> {
        let sessions = manager(Arc::new(MemorySessionStore::new()));
        assert_eq!(sessions.validate_at(None, T0).await?, SessionState::Anonymous);
        assert_eq!(sessions.validate_at(Some(""), T0).await?, SessionState::Anonymous);
        assert_eq!(
            sessions.validate_at(Some("forged"), T0).await?,
            SessionState::Anonymous
        );
        Ok(())
    }

    #[tokio::test]
    async fn store_never_sees_raw_token() -> Result<()> {
        let store = Arc::new(MemorySessionStore::new());
        let sessions = manager(store.clone());
        let issued = sessions.issue_at(&identity(Role::User)?, None, T0).await?;
        assert!(store.get(issued.token.as_bytes()).await?.is_none());
        assert_eq!(store.len().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn unauthenticated_record_is_anonymous() -> Result<()> {
        let store = Arc::new(MemorySessionStore::new());
        let sessions = manager(store.clone());
        let issued = sessions.issue_at(&identity(Role::User)?, None, T0).await?;
        let key = sessions.digest(&issued.token);
        let mut record = store.get(&key).await?.context("record")?;
        record.authenticated = false;
        store.set(&key, record).await?;

        assert_eq!(
            sessions.validate_at(Some(&issued.token), T0 + 1).await?,
            SessionState::Anonymous
        );
        Ok(())
    }

    #[tokio::test]
    async fn reissue_retires_previous_token() -> Result<()> {
        let store = Arc::new(MemorySessionStore::new());
        let sessions = manager(store.clone());
        let identity = identity(Role::User)?;
        let first = sessions.issue_at(&identity, None, T0).await?;
        let second = sessions
            .issue_at(&identity, Some(&first.token), T0 + 10)
            .await?;

        assert_eq!(
            sessions.validate_at(Some(&first.token), T0 + 11).await?,
            SessionState::Anonymous
        );
        assert!(sessions
            .validate_at(Some(&second.token), T0 + 11)
            .await?
            .identity()
            .is_some());
        assert_eq!(store.len().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn destroy_is_idempotent() -> Result<()> {
        let sessions = manager(Arc::new(MemorySessionStore::new()));
        let issued = sessions.issue_at(&identity(Role::Admin)?, None, T0).await?;
        sessions.destroy(Some(&issued.token)).await?;
        sessions.destroy(Some(&issued.token)).await?;
        sessions.destroy(None).await?;
        assert_eq!(
            sessions.validate_at(Some(&issued.token), T0 + 1).await?,
            SessionState::Anonymous
        );
        Ok(())
    }

    #[tokio::test]
    async fn purge_removes_expired_sessions() -> Result<()> {
        let store = Arc::new(MemorySessionStore::new());
        let sessions = manager(store.clone());
        let identity = identity(Role::User)?;
        sessions.issue_at(&identity, None, T0).await?;
        sessions.issue_at(&identity, None, T0 + 1800).await?;

        assert_eq!(sessions.purge_expired_at(T0 + 3600).await?, 1);
        assert_eq!(store.len().await, 1);
        Ok(())
    }

    #[test]
    fn debug_hides_secret_and_token() {
        let sessions = manager(Arc::new(MemorySessionStore::new()));
        assert!(!format!("{sessions:?}").contains("test-secret"));
        let issued = IssuedSession {
            token: "raw-token".to_string(),
            expires_at: T0,
        };
        assert!(!format!("{issued:?}").contains("raw-token"));
    }
}
