//! HTTP error responses
//!
//! Every error body has the shape `{"error": {"code", "message"}}`. Messages
//! for infrastructure failures are generic; details go to the log only.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::workflow::ModalError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Too many open sessions (503)
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Step not available in the current modal phase (409)
    #[error("Conflict: {0}")]
    Conflict(#[from] ModalError),

    /// invite-common error, mapped by kind
    #[error(transparent)]
    Common(#[from] invite_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        use invite_common::Error as E;

        let (status, code, message) = match &self {
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, "NOT_FOUND", format!("{} not found", what)),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Unavailable(msg) => {
                error!("Request refused: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_BUSY",
                    "Too many guests are signing in right now. Please try again shortly.".to_string(),
                )
            }
            ApiError::Conflict(e) => (StatusCode::CONFLICT, "CONFLICT", e.to_string()),
            ApiError::Common(e) => {
                let (status, code) = match e {
                    E::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                    E::InvalidInput(_) | E::InvalidPhone(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
                    E::CodeInvalidOrExpired => (StatusCode::BAD_REQUEST, "CODE_INVALID"),
                    E::AlreadySubmitted => (StatusCode::CONFLICT, "ALREADY_SUBMITTED"),
                    E::NotOwner => (StatusCode::FORBIDDEN, "NOT_OWNER"),
                    E::SmsTransport(_) => (StatusCode::BAD_GATEWAY, "SMS_UNAVAILABLE"),
                    E::Database(_) | E::Io(_) | E::Config(_) | E::Internal(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                    }
                };
                if status.is_server_error() {
                    error!("Request failed: {}", e);
                }
                (status, code, e.user_message())
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
