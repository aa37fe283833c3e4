//! Admin API endpoints (all require AdminGuard).

use super::{validate_tag, ApiJson};
use crate::auth::middleware::{AdminGuard, AppState};
use crate::error::AppError;
use crate::live::{AuthEventKind, LiveEvent};
use crate::models::{RegisterPubkeyRequest, RegisteredResponse};
use axum::{extract::State, Json};

/// POST /admin/register_pubkey: Register or replace a client public key
pub async fn register_pubkey(
    _admin: AdminGuard,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterPubkeyRequest>,
) -> Result<Json<RegisteredResponse>, AppError> {
    let kid = req.kid.trim();
    validate_tag(kid, "kid")?;

    state.auth.register(kid, &req.public_key).await?;

    tracing::info!(action = "key_registered", kid = %kid, "Public key registered");
    state.live.emit(LiveEvent::Auth {
        event: AuthEventKind::KeyRegistered,
        kid: Some(kid.to_string()),
        aud: None,
        reason: None,
        ts: state.now(),
    });

    Ok(Json(RegisteredResponse {
        ok: true,
        registered: state.auth.registered_kids(),
    }))
}

/// GET /admin/pubkeys: List registered kids
pub async fn list_pubkeys(
    _admin: AdminGuard,
    State(state): State<AppState>,
) -> Json<RegisteredResponse> {
    Json(RegisteredResponse {
        ok: true,
        registered: state.auth.registered_kids(),
    })
}
