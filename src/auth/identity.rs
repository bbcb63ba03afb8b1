//! Roles, identities and the validated value types the stores accept.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use super::validate::{validate, FieldRule, RawInput, Schema, ValidationError, EMAIL_RULE, USERNAME_RULE};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

fn parse_single(rule: FieldRule, value: &str) -> Result<String, ValidationError> {
    let input = RawInput::new().with_text(rule.name(), value);
    let fields = validate(&input, &Schema::new(vec![rule]))?;
    Ok(fields.text(rule.name()).unwrap_or_default().to_string())
}

/// Alphanumeric username of at most 20 characters.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    /// # Errors
    /// Returns a [`ValidationError`] when `value` breaks the username rule.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        parse_single(USERNAME_RULE, value).map(Self)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Syntactically valid email address.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    /// # Errors
    /// Returns a [`ValidationError`] when `value` is not a valid email.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        parse_single(EMAIL_RULE, value).map(Self)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who an authenticated session belongs to.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, ToSchema)]
pub struct Identity {
    username: String,
    email: String,
    role: Role,
}

impl Identity {
    #[must_use]
    pub fn new(username: Username, email: Email, role: Role) -> Self {
        Self {
            username: username.0,
            email: email.0,
            role,
        }
    }

    /// Rebuild from stored session fields; `None` if the username is empty.
    pub(crate) fn from_parts(username: String, email: String, role: Role) -> Option<Self> {
        if username.is_empty() {
            return None;
        }
        Some(Self {
            username,
            email,
            role,
        })
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }
}
