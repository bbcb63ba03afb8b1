use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use super::session::extract_session_token;
use crate::auth::AuthService;

pub const RANDOM_NUMBER_MAX: u32 = 10_000;

#[derive(ToSchema, Serialize, Debug)]
pub struct MembersResponse {
    username: String,
    random_number: u32,
}

#[utoipa::path(
    get,
    path = "/members",
    responses(
        (status = 200, description = "Members area", body = MembersResponse),
        (status = 303, description = "No session, redirect to /login")
    ),
    tag = "memberauth"
)]
pub async fn members(headers: HeaderMap, service: Extension<Arc<AuthService>>) -> impl IntoResponse {
    let token = extract_session_token(&headers);
    match service.require_identity(token.as_deref()).await {
        Ok(identity) => (
            StatusCode::OK,
            Json(MembersResponse {
                username: identity.username().to_string(),
                random_number: rand::thread_rng().gen_range(1..=RANDOM_NUMBER_MAX),
            }),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}
