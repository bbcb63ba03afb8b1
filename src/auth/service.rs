//! Signup, login, logout, admin and diagnostic lookup flows.
//!
//! Handlers hand raw input and the presented session token to [`AuthService`];
//! it validates, talks to the stores and answers with typed outcomes. Nothing
//! here knows about HTTP.

use anyhow::Result;
use secrecy::SecretString;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use super::{
    config::AuthConfig,
    error::AuthError,
    gate::require_admin,
    identity::{Email, Identity, Role, Username},
    password::PasswordHasher,
    session::{IssuedSession, SessionManager, SessionState},
    validate::{schemas, validate, FieldValue, RawInput, ValidationError, EMAIL_RULE, ROLE_RULE},
};
use crate::store::{CredentialStore, InsertOutcome, NewUser, SessionStore, User};

/// User as shown to admins; never carries the password hash.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, ToSchema)]
pub struct UserSummary {
    pub username: String,
    pub email: String,
    pub role: Role,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            username: user.username,
            email: user.email,
            role: user.role,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LookupOutcome {
    /// No `user` parameter was supplied.
    NoUser,
    /// A plain value was looked up; `matches` is how many records carry it.
    Looked { username: String, matches: usize },
}

pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    sessions: SessionManager,
    hasher: PasswordHasher,
    config: AuthConfig,
}

impl AuthService {
    /// # Errors
    /// Returns an error if the configured bcrypt cost is out of range.
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        session_store: Arc<dyn SessionStore>,
        config: AuthConfig,
        session_secret: SecretString,
    ) -> Result<Self> {
        let hasher = PasswordHasher::new(config.bcrypt_cost())?;
        let sessions = SessionManager::new(session_store, config.session_ttl_seconds(), session_secret);
        Ok(Self {
            credentials,
            sessions,
            hasher,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Session state for the presented token.
    ///
    /// # Errors
    /// Returns [`AuthError::Store`] if the session store fails.
    pub async fn current(&self, token: Option<&str>) -> Result<SessionState, AuthError> {
        Ok(self.sessions.validate(token).await?)
    }

    /// # Errors
    /// Returns [`AuthError::Unauthenticated`] when no valid session is presented.
    pub async fn require_identity(&self, token: Option<&str>) -> Result<Identity, AuthError> {
        match self.current(token).await? {
            SessionState::Authenticated(identity) => Ok(identity),
            SessionState::Anonymous => Err(AuthError::Unauthenticated),
        }
    }

    /// Create a user with role `user` and log them in.
    ///
    /// # Errors
    /// Returns [`AuthError::Validation`] for bad input or an email that is
    /// already registered, [`AuthError::Store`] if a store fails.
    pub async fn signup(
        &self,
        input: &RawInput,
        previous: Option<&str>,
    ) -> Result<IssuedSession, AuthError> {
        let fields = validate(input, &schemas::signup())?;
        let username = Username::parse(fields.text("username").unwrap_or_default())?;
        let email = Email::parse(fields.text("email").unwrap_or_default())?;
        let password = fields.text("password").unwrap_or_default().to_string();

        let password_hash = self.hasher.hash_blocking(password).await?;
        let new_user = NewUser {
            username: username.clone(),
            email: email.clone(),
            password_hash,
            role: Role::User,
        };
        match self.credentials.insert(new_user).await? {
            InsertOutcome::Created(user) => {
                info!(username = %user.username, "User created");
            }
            InsertOutcome::Conflict => {
                return Err(ValidationError::field(&EMAIL_RULE, "Email is already registered").into());
            }
        }

        let identity = Identity::new(username, email, Role::User);
        Ok(self.sessions.issue(&identity, previous).await?)
    }

    /// Verify credentials and issue a session.
    ///
    /// Unknown emails, wrong passwords and unusable input all end in the same
    /// [`AuthError::Authentication`].
    ///
    /// # Errors
    /// Returns [`AuthError::Authentication`] on any credential failure,
    /// [`AuthError::Store`] if a store fails.
    pub async fn login(
        &self,
        input: &RawInput,
        previous: Option<&str>,
    ) -> Result<IssuedSession, AuthError> {
        let fields = match validate(input, &schemas::login()) {
            Ok(fields) => fields,
            Err(err) => {
                debug!("Login input rejected: {err}");
                return Err(AuthError::Authentication);
            }
        };
        let email = Email::parse(fields.text("email").unwrap_or_default())
            .map_err(|_| AuthError::Authentication)?;
        let password = fields.text("password").unwrap_or_default().to_string();

        let user = self.credentials.find_by_email(&email).await?;
        let stored_hash = user.as_ref().map(|user| user.password_hash.clone());
        if !self.hasher.verify_blocking(password, stored_hash).await? {
            debug!("Login failed");
            return Err(AuthError::Authentication);
        }

        let identity = user
            .and_then(|user| Identity::from_parts(user.username, user.email, user.role))
            .ok_or(AuthError::Authentication)?;
        info!(username = identity.username(), "User logged in");
        Ok(self.sessions.issue(&identity, previous).await?)
    }

    /// # Errors
    /// Returns [`AuthError::Store`] if the session store fails.
    pub async fn logout(&self, token: Option<&str>) -> Result<(), AuthError> {
        Ok(self.sessions.destroy(token).await?)
    }

    /// # Errors
    /// Returns [`AuthError::Unauthenticated`] / [`AuthError::Authorization`]
    /// unless an admin session is presented.
    pub async fn list_users(&self, token: Option<&str>) -> Result<Vec<UserSummary>, AuthError> {
        let identity = self.require_identity(token).await?;
        require_admin(&identity)?;
        let users = self.credentials.list_all().await?;
        Ok(users.into_iter().map(UserSummary::from).collect())
    }

    /// Change the role of the user named in `input`.
    ///
    /// Live sessions keep the role they were issued with; the change shows up
    /// on the target's next login. Returns whether a user matched.
    ///
    /// # Errors
    /// Returns [`AuthError::Unauthenticated`] / [`AuthError::Authorization`]
    /// unless an admin session is presented, [`AuthError::Validation`] for
    /// bad input.
    pub async fn change_role(&self, token: Option<&str>, input: &RawInput) -> Result<bool, AuthError> {
        let identity = self.require_identity(token).await?;
        require_admin(&identity)?;

        let fields = validate(input, &schemas::role_change())?;
        let username = Username::parse(fields.text("username").unwrap_or_default())?;
        let role: Role = fields
            .text("role")
            .unwrap_or_default()
            .parse()
            .map_err(|_| ValidationError::field(&ROLE_RULE, "Role must be one of: user, admin"))?;

        let matched = self.credentials.update_role(&username, role).await?;
        if matched {
            info!(admin = identity.username(), target = %username, %role, "Role changed");
        } else {
            warn!(admin = identity.username(), target = %username, "Role change matched no user");
        }
        Ok(matched)
    }

    /// Diagnostic lookup by username that refuses structured values.
    ///
    /// # Errors
    /// Returns [`AuthError::Validation`] when `user` is not a plain string of
    /// at most 20 characters; the credential store is not consulted then.
    pub async fn lookup_user(&self, input: &RawInput) -> Result<LookupOutcome, AuthError> {
        match input.get("user") {
            None => return Ok(LookupOutcome::NoUser),
            Some(FieldValue::Text(text)) if text.is_empty() => return Ok(LookupOutcome::NoUser),
            Some(_) => {}
        }

        let fields = validate(input, &schemas::lookup()).inspect_err(|err| {
            if err.is_injection() {
                warn!("Structured value rejected on user lookup");
            }
        })?;
        let user = fields.text("user").unwrap_or_default().to_string();

        // Signup only accepts alphanumeric usernames, so anything else has no match.
        let matches = match Username::parse(&user) {
            Ok(username) => self.credentials.find_by_username(&username).await?.len(),
            Err(_) => 0,
        };
        debug!(matches, "User lookup");
        Ok(LookupOutcome::Looked {
            username: user,
            matches,
        })
    }

    /// # Errors
    /// Returns an error if the credential store is unreachable.
    pub async fn health(&self) -> Result<()> {
        self.credentials.ping().await
    }
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("sessions", &self.sessions)
            .field("hasher", &self.hasher)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
