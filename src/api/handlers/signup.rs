use axum::{
    body::Bytes,
    extract::Extension,
    http::{header::CONTENT_TYPE, HeaderMap},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use super::{
    error::ErrorBody,
    session::{extract_session_token, session_redirect},
};
use crate::auth::{validate::RawInput, AuthError, AuthService};

#[derive(ToSchema, Serialize, Debug)]
pub struct SignupForm {
    pub username: String,
    pub email: String,
    pub password: String,
}

pub(crate) fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
}

#[utoipa::path(
    post,
    path = "/signup",
    request_body(
        content = SignupForm,
        content_type = "application/x-www-form-urlencoded",
        description = "Form or JSON body"
    ),
    responses(
        (status = 303, description = "User created, session cookie set, redirect to /members"),
        (status = 400, description = "Invalid input or email already registered", body = ErrorBody),
        (status = 500, description = "Store failure", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn signup(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
    body: Bytes,
) -> Response {
    let input = match RawInput::from_body(content_type(&headers), &body) {
        Ok(input) => input,
        Err(err) => return AuthError::from(err).into_response(),
    };
    let previous = extract_session_token(&headers);

    match service.signup(&input, previous.as_deref()).await {
        Ok(issued) => session_redirect(service.config(), &issued.token, "/members"),
        Err(err) => err.into_response(),
    }
}
