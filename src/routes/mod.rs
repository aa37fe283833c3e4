//! API route handlers.

pub mod admin;
pub mod alerts;
pub mod auth;
pub mod shadow;

use crate::auth::keys::{is_valid_kid, MAX_KID_LEN};
use crate::auth::middleware::AppState;
use crate::error::AppError;
use crate::middleware::security_headers;
use crate::models::HealthResponse;
use axum::{
    extract::{FromRequest, FromRequestParts, Query, Request, State},
    http::request::Parts,
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub const SERVICE_NAME: &str = "mcm-guardian";

/// Validate a kid or audience tag: 1-128 chars of `[A-Za-z0-9._:-]`.
pub fn validate_tag(value: &str, label: &str) -> Result<(), AppError> {
    if !is_valid_kid(value) {
        return Err(AppError::BadRequest(format!(
            "Invalid {} (1-{} chars of A-Z a-z 0-9 . _ : -)",
            label, MAX_KID_LEN
        )));
    }
    Ok(())
}

/// JSON body extractor whose rejection is an [`AppError`].
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        Ok(ApiJson(value))
    }
}

/// Query string extractor whose rejection is an [`AppError`].
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        Ok(ApiQuery(value))
    }
}

/// GET /health: liveness
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        service: SERVICE_NAME,
        subscribers: state.live.subscriber_count(),
        storage: state.store.backend_name(),
    })
}

async fn not_found() -> AppError {
    AppError::NotFound("No such route".to_string())
}

/// Build the API router with all endpoints.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        // Auth endpoints
        .route("/auth/challenge", get(auth::challenge))
        .route("/guardian/verify", post(auth::verify))
        .route("/auth/refresh", post(auth::refresh))
        .route("/guardian/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .route("/guardian/logout", post(auth::logout))
        .route("/protected/hello", get(auth::hello))
        // Admin endpoints
        .route("/admin/register_pubkey", post(admin::register_pubkey))
        .route("/admin/pubkeys", get(admin::list_pubkeys))
        // Live feed
        .route("/shadow/ws", get(shadow::live_socket))
        .route("/shadow/ingest", post(shadow::ingest))
        // Alerts
        .route("/alerts", get(alerts::list))
        .route("/alerts/ingest", post(alerts::ingest))
        .route("/alerts/buffer", get(alerts::buffer))
        .route("/alerts/resolve", post(alerts::resolve))
        .route("/alerts/health", get(alerts::health))
        .fallback(not_found)
}

/// The full application: routes, body limit, CORS, security headers and tracing.
pub fn app(state: AppState) -> Router {
    let body_limit = state.config.max_body_bytes;

    // No allowed origins: every cross-origin preflight is rejected
    let cors = CorsLayer::new();

    api_router()
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(axum::middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
