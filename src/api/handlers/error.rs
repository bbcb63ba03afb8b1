//! Map [`AuthError`] onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Redirect, Response},
};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::auth::{error::INVALID_CREDENTIALS, validate::FieldIssue, AuthError};

#[derive(ToSchema, Serialize, Debug)]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[schema(value_type = Vec<Object>)]
    pub errors: Vec<FieldIssue>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub injection_detected: bool,
}

impl ErrorBody {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            errors: Vec::new(),
            injection_detected: false,
        }
    }
}

pub(crate) fn json_error(status: StatusCode, body: ErrorBody) -> Response {
    (status, Json(body)).into_response()
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(err) => json_error(
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    message: err.message(),
                    injection_detected: err.is_injection(),
                    errors: err.issues().to_vec(),
                },
            ),
            Self::Authentication => json_error(
                StatusCode::BAD_REQUEST,
                ErrorBody::message(INVALID_CREDENTIALS),
            ),
            Self::Unauthenticated => Redirect::to("/login").into_response(),
            Self::Authorization => json_error(
                StatusCode::FORBIDDEN,
                ErrorBody::message("You are not authorized to view this page"),
            ),
            Self::Store(err) => {
                error!("Store failure: {err:#}");
                json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::message("Internal server error"),
                )
            }
        }
    }
}
