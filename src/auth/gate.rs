//! Admin authorization, derived from the role stored in the session.

use super::error::AuthError;
use super::identity::{Identity, Role};

#[must_use]
pub fn is_admin(identity: &Identity) -> bool {
    identity.role() == Role::Admin
}

/// # Errors
/// Returns [`AuthError::Authorization`] unless `identity` is an admin.
pub fn require_admin(identity: &Identity) -> Result<(), AuthError> {
    if is_admin(identity) {
        Ok(())
    } else {
        Err(AuthError::Authorization)
    }
}
