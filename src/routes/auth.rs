//! Auth API endpoints.

use super::{validate_tag, ApiJson, ApiQuery};
use crate::auth::middleware::{AppState, AuthSession, BearerToken, RateLimited};
use crate::error::AppError;
use crate::live::{AuthEventKind, LiveEvent};
use crate::models::{
    ChallengeQuery, ChallengeResponse, HelloResponse, OkResponse, RefreshResponse, VerifyRequest,
    VerifyResponse,
};
use axum::{extract::State, Json};

fn auth_event(
    state: &AppState,
    event: AuthEventKind,
    kid: Option<String>,
    aud: Option<String>,
    reason: Option<&'static str>,
) {
    state.live.emit(LiveEvent::Auth {
        event,
        kid,
        aud,
        reason,
        ts: state.now(),
    });
}

/// GET /auth/challenge?aud=: Issue a single-use nonce
pub async fn challenge(
    State(state): State<AppState>,
    _limit: RateLimited,
    ApiQuery(query): ApiQuery<ChallengeQuery>,
) -> Result<Json<ChallengeResponse>, AppError> {
    let aud = query.aud.unwrap_or_default();
    let aud = aud.trim();
    validate_tag(aud, "aud")?;

    let challenge = state.auth.challenge(aud);
    tracing::debug!(action = "challenge_issued", aud = %aud, "Challenge issued");
    auth_event(
        &state,
        AuthEventKind::ChallengeIssued,
        None,
        Some(challenge.aud.clone()),
        None,
    );

    Ok(Json(ChallengeResponse {
        ok: true,
        nonce: challenge.nonce,
        aud: challenge.aud,
        ts: challenge.issued_at,
        exp: challenge.expires_at,
    }))
}

/// POST /guardian/verify: Verify a signed assertion and mint a session
pub async fn verify(
    State(state): State<AppState>,
    _limit: RateLimited,
    ApiJson(req): ApiJson<VerifyRequest>,
) -> Result<Json<VerifyResponse>, AppError> {
    match state.auth.verify(&req.jws).await {
        Ok(verified) => {
            tracing::info!(action = "verify_ok", kid = %verified.kid, aud = %verified.claims.aud, "Assertion verified");
            auth_event(
                &state,
                AuthEventKind::VerifyOk,
                Some(verified.kid.clone()),
                Some(verified.claims.aud.clone()),
                None,
            );
            Ok(Json(VerifyResponse {
                ok: true,
                kid: verified.kid,
                payload: verified.claims,
                session: verified.session.token,
                exp: verified.session.expires_at,
            }))
        }
        Err(e) => {
            tracing::warn!(action = "verify_failed", reason = e.reason(), error = %e, "Assertion rejected");
            auth_event(&state, AuthEventKind::VerifyFailed, None, None, Some(e.reason()));
            Err(e.into())
        }
    }
}

/// GET /protected/hello: Echo the caller's session
pub async fn hello(session: AuthSession) -> Json<HelloResponse> {
    Json(HelloResponse {
        ok: true,
        kid: session.kid,
        exp: session.expires_at,
    })
}

/// POST /auth/refresh, /guardian/refresh: Extend the caller's session
pub async fn refresh(
    State(state): State<AppState>,
    session: AuthSession,
) -> Result<Json<RefreshResponse>, AppError> {
    let exp = state.auth.refresh(&session.token).await?;
    tracing::debug!(action = "session_refreshed", kid = %session.kid, exp, "Session refreshed");
    auth_event(&state, AuthEventKind::Refreshed, Some(session.kid), None, None);
    Ok(Json(RefreshResponse { ok: true, exp }))
}

/// POST /auth/logout, /guardian/logout: Revoke the presented token
///
/// Always succeeds for a well-formed bearer header, whether or not the
/// session still exists.
pub async fn logout(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> Json<OkResponse> {
    if state.auth.logout(&token).await {
        tracing::info!(action = "logout", "Session revoked");
        auth_event(&state, AuthEventKind::LoggedOut, None, None, None);
    }
    Json(OkResponse { ok: true })
}
