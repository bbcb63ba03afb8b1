//! HTTP handlers.
//!
//! Handlers only translate between HTTP and [`crate::auth::AuthService`]: they
//! read the session token and raw input, call the service, and map outcomes
//! to redirects, JSON bodies and status codes.

pub mod admin;
pub mod error;
pub mod health;
pub mod injection;
pub mod login;
pub mod members;
pub mod root;
pub mod session;
pub mod signup;

use axum::{http::StatusCode, response::IntoResponse};

use error::{json_error, ErrorBody};

pub async fn not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, ErrorBody::message("Page not found"))
}
