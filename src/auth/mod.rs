//! Authentication core: validation, password hashing, sessions and the admin gate.

pub mod config;
pub mod error;
pub mod gate;
pub mod identity;
pub mod password;
pub mod service;
pub mod session;
pub mod validate;

pub use config::AuthConfig;
pub use error::AuthError;
pub use identity::{Email, Identity, Role, Username};
pub use service::{AuthService, LookupOutcome, UserSummary};
pub use session::{SessionManager, SessionState};
