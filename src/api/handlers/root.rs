use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use super::session::extract_session_token;
use crate::auth::{AuthService, SessionState};

#[derive(ToSchema, Serialize, Debug)]
pub struct RootResponse {
    authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
}

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Session summary", body = RootResponse)
    ),
    tag = "memberauth"
)]
pub async fn root(headers: HeaderMap, service: Extension<Arc<AuthService>>) -> impl IntoResponse {
    let token = extract_session_token(&headers);
    match service.current(token.as_deref()).await {
        Ok(SessionState::Authenticated(identity)) => (
            StatusCode::OK,
            Json(RootResponse {
                authenticated: true,
                username: Some(identity.username().to_string()),
            }),
        )
            .into_response(),
        Ok(SessionState::Anonymous) => (
            StatusCode::OK,
            Json(RootResponse {
                authenticated: false,
                username: None,
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}
