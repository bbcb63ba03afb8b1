use axum::{
    body::Bytes,
    extract::Extension,
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use utoipa::ToSchema;

use super::{
    error::ErrorBody,
    session::{extract_session_token, session_redirect},
    signup::content_type,
};
use crate::auth::{validate::RawInput, AuthError, AuthService};

#[derive(ToSchema, Serialize, Debug)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[utoipa::path(
    post,
    path = "/login",
    request_body(
        content = LoginForm,
        content_type = "application/x-www-form-urlencoded",
        description = "Form or JSON body"
    ),
    responses(
        (status = 303, description = "Logged in, session cookie set, redirect to /members"),
        (status = 400, description = "Invalid email/password combination", body = ErrorBody),
        (status = 500, description = "Store failure", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
    body: Bytes,
) -> Response {
    // Unparseable bodies get the same answer as bad credentials.
    let input = match RawInput::from_body(content_type(&headers), &body) {
        Ok(input) => input,
        Err(err) => {
            debug!("Login body rejected: {err}");
            return AuthError::Authentication.into_response();
        }
    };
    let previous = extract_session_token(&headers);

    match service.login(&input, previous.as_deref()).await {
        Ok(issued) => session_redirect(service.config(), &issued.token, "/members"),
        Err(err) => err.into_response(),
    }
}
