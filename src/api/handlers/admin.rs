use axum::{
    body::Bytes,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Redirect, Response},
};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use super::{error::ErrorBody, session::extract_session_token, signup::content_type};
use crate::auth::{validate::RawInput, AuthError, AuthService, UserSummary};

#[derive(ToSchema, Serialize, Debug)]
pub struct UsersResponse {
    users: Vec<UserSummary>,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct RoleChangeForm {
    pub username: String,
    /// `user` or `admin`
    pub role: String,
}

#[utoipa::path(
    get,
    path = "/admin",
    responses(
        (status = 200, description = "All users, without password hashes", body = UsersResponse),
        (status = 303, description = "No session, redirect to /login"),
        (status = 403, description = "Session is not an admin", body = ErrorBody)
    ),
    tag = "admin"
)]
pub async fn list_users(headers: HeaderMap, service: Extension<Arc<AuthService>>) -> Response {
    let token = extract_session_token(&headers);
    match service.list_users(token.as_deref()).await {
        Ok(users) => (StatusCode::OK, Json(UsersResponse { users })).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/admin",
    request_body(
        content = RoleChangeForm,
        content_type = "application/x-www-form-urlencoded",
        description = "Form or JSON body"
    ),
    responses(
        (status = 303, description = "Role updated, redirect to /admin"),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 403, description = "Session is not an admin", body = ErrorBody)
    ),
    tag = "admin"
)]
pub async fn change_role(
    headers: HeaderMap,
    service: Extension<Arc<AuthService>>,
    body: Bytes,
) -> Response {
    let token = extract_session_token(&headers);
    let input = match RawInput::from_body(content_type(&headers), &body) {
        Ok(input) => input,
        Err(err) => return AuthError::from(err).into_response(),
    };
    match service.change_role(token.as_deref(), &input).await {
        Ok(_) => Redirect::to("/admin").into_response(),
        Err(err) => err.into_response(),
    }
}
