use secrecy::SecretString;

/// Secrets collected at startup; never printed.
#[derive(Clone)]
pub struct GlobalArgs {
    pub session_secret: SecretString,
    pub db_password: Option<SecretString>,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(session_secret: SecretString) -> Self {
        Self {
            session_secret,
            db_password: None,
        }
    }

    #[must_use]
    pub fn with_db_password(mut self, password: Option<SecretString>) -> Self {
        self.db_password = password;
        self
    }
}

impl std::fmt::Debug for GlobalArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalArgs")
            .field("session_secret", &"***")
            .field("db_password", &self.db_password.as_ref().map(|_| "***"))
            .finish()
    }
}
