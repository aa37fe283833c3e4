//! Error types and Axum response conversions.
//!
//! Every failure leaves the service as a non-2xx status with the body
//! `{"ok": false, "reason": "<tag>"}`. Clients branch on the tag.

use crate::auth::AuthError;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application error types.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Auth(e) if e.is_client_format() => StatusCode::BAD_REQUEST,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Wire tag for the `reason` field.
    pub fn reason(&self) -> &'static str {
        match self {
            AppError::Auth(e) => e.reason(),
            AppError::BadRequest(_) => "bad-request",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not-found",
            AppError::RateLimited { .. } => "rate-limited",
            AppError::Internal(_) => "server-error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Internal(msg) => {
                // Log detailed error server-side, return only the tag to the client
                tracing::error!(error = %msg, "Internal server error");
            }
            AppError::BadRequest(msg) => {
                tracing::debug!(error = %msg, "Rejected request");
            }
            _ => {}
        }

        let status = self.status();
        let body = Json(json!({
            "ok": false,
            "reason": self.reason(),
        }));
        let mut response = (status, body).into_response();

        if let AppError::RateLimited { retry_after_secs } = self {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(retry_after_secs.max(1)),
            );
        }

        response
    }
}
