use thiserror::Error;

use super::validate::ValidationError;

/// Message returned for every failed login, whatever the cause.
pub const INVALID_CREDENTIALS: &str = "Invalid email/password combination";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("Invalid email/password combination")]
    Authentication,
    #[error("not authenticated")]
    Unauthenticated,
    #[error("not authorized")]
    Authorization,
    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl AuthError {
    /// True for validation failures caused by structured (operator-shaped) input.
    #[must_use]
    pub fn is_injection(&self) -> bool {
        matches!(self, Self::Validation(err) if err.is_injection())
    }
}
