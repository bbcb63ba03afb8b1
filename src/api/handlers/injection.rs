//! Diagnostic lookup that shows query-operator injection being refused.

use axum::{
    extract::{Extension, RawQuery},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use super::error::{json_error, ErrorBody};
use crate::auth::{validate::RawInput, AuthService, LookupOutcome};

pub const USAGE_HINT: &str =
    "no user provided - try /nosql-injection?user=name or /nosql-injection?user[$ne]=name";
pub const INJECTION_DETECTED: &str = "NoSQL injection attack detected";

#[derive(ToSchema, Serialize, Debug)]
pub struct LookupResponse {
    message: String,
}

#[utoipa::path(
    get,
    path = "/nosql-injection",
    params(
        ("user" = Option<String>, Query, description = "Username to look up")
    ),
    responses(
        (status = 200, description = "Usage hint or greeting", body = LookupResponse),
        (status = 400, description = "Structured or invalid value", body = ErrorBody)
    ),
    tag = "memberauth"
)]
pub async fn nosql_injection(
    RawQuery(query): RawQuery,
    service: Extension<Arc<AuthService>>,
) -> Response {
    let input = RawInput::from_urlencoded(query.unwrap_or_default().as_bytes());
    match service.lookup_user(&input).await {
        Ok(LookupOutcome::NoUser) => (
            StatusCode::OK,
            Json(LookupResponse {
                message: USAGE_HINT.to_string(),
            }),
        )
            .into_response(),
        Ok(LookupOutcome::Looked { username, .. }) => (
            StatusCode::OK,
            Json(LookupResponse {
                message: format!("Hello {username}"),
            }),
        )
            .into_response(),
        Err(err) if err.is_injection() => json_error(
            StatusCode::BAD_REQUEST,
            ErrorBody {
                message: INJECTION_DETECTED.to_string(),
                errors: Vec::new(),
                injection_detected: true,
            },
        ),
        Err(err) => err.into_response(),
    }
}
