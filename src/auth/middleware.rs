//! Axum extractors for authentication and rate limiting.

use super::error::AuthError;
use super::service::AuthService;
use crate::alerts::{AlertCoalescer, CoalesceConfig};
use crate::clock::Clock;
use crate::config::Config;
use crate::error::AppError;
use crate::live::Broadcaster;
use crate::rate_limit::SlidingWindowLimiter;
use crate::storage::SnapshotStore;
use axum::{
    extract::{ConnectInfo, FromRequestParts, MatchedPath},
    http::request::Parts,
};
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;

/// Header carrying the admin secret.
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub limiter: Arc<SlidingWindowLimiter>,
    pub live: Arc<Broadcaster>,
    pub alerts: Arc<AlertCoalescer>,
    pub store: Arc<dyn SnapshotStore>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Build every component from `config` on top of the given clock and store.
    pub fn new(config: Config, clock: Arc<dyn Clock>, store: Arc<dyn SnapshotStore>) -> Self {
        let auth = AuthService::new(
            config.nonce_ttl_secs,
            config.session_ttl_secs,
            clock.clone(),
            store.clone(),
        );
        let limiter = SlidingWindowLimiter::new(
            config.rate_limit_max_requests,
            Duration::from_secs(config.rate_limit_window_secs),
        );
        let alerts = AlertCoalescer::new(CoalesceConfig {
            coalesce_window_secs: config.alert_coalesce_window_secs,
            buffer_window_secs: config.alert_buffer_window_secs,
            group_ttl_secs: config.alert_group_ttl_secs,
        });

        Self {
            auth: Arc::new(auth),
            limiter: Arc::new(limiter),
            live: Arc::new(Broadcaster::new(config.live_channel_capacity)),
            alerts: Arc::new(alerts),
            store,
            clock,
            config: Arc::new(config),
        }
    }

    pub fn now(&self) -> u64 {
        self.clock.now_secs()
    }
}

/// Pull the token out of `Authorization: Bearer {token}`.
fn bearer_token(parts: &Parts) -> Result<String, AuthError> {
    let header = parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::Unauthorized)?;

    let (scheme, token) = header.split_once(' ').ok_or(AuthError::Unauthorized)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::Unauthorized);
    }
    Ok(token.to_string())
}

/// Authenticated session extractor.
///
/// Resolves the bearer token to a live session. Returns 401 if the header is
/// missing or malformed, or the session is unknown or expired.
pub struct AuthSession {
    pub kid: String,
    pub token: String,
    pub expires_at: u64,
}

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let session = state.auth.authorize(&token)?;
        Ok(AuthSession {
            kid: session.kid,
            token: session.token,
            expires_at: session.expires_at,
        })
    }
}

/// Raw bearer token, not checked against the session store.
///
/// Logout uses this so revoking an unknown or expired token still succeeds.
pub struct BearerToken(pub String);

impl FromRequestParts<AppState> for BearerToken {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(BearerToken(bearer_token(parts)?))
    }
}

/// Admin guard.
///
/// With `ADMIN_TOKEN` configured, requires a matching `X-Admin-Token` header
/// (compared in constant time) and returns 403 otherwise. Without it, admin
/// endpoints are open.
pub struct AdminGuard;

impl FromRequestParts<AppState> for AdminGuard {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.admin_token.as_deref() else {
            return Ok(AdminGuard);
        };

        let presented = parts
            .headers
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Forbidden("Admin token required".to_string()))?;

        if bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
            Ok(AdminGuard)
        } else {
            tracing::warn!(action = "admin_denied", "Admin token mismatch");
            Err(AppError::Forbidden("Invalid admin token".to_string()))
        }
    }
}

/// Client IP used as the rate limit key.
///
/// The TCP peer address, or with `TRUSTED_PROXY_COUNT = n > 0` the n-th
/// `X-Forwarded-For` entry from the right (each trusted proxy appends one).
/// Falls back to the peer address when the header is absent, too short or
/// unparsable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddr(pub IpAddr);

impl FromRequestParts<AppState> for ClientAddr {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let ConnectInfo(peer) = ConnectInfo::<SocketAddr>::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::Internal(format!("Missing connect info: {}", e)))?;

        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok());

        Ok(ClientAddr(resolve_client_ip(
            peer.ip(),
            forwarded,
            state.config.trusted_proxy_count,
        )))
    }
}

/// Rate-limit gate keyed on the matched route and the client address.
///
/// A parts extractor, so it runs before any body extractor: requests with
/// malformed or oversized bodies still count against the window.
#[derive(Debug, Clone, Copy)]
pub struct RateLimited(pub ClientAddr);

impl FromRequestParts<AppState> for RateLimited {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let client = ClientAddr::from_request_parts(parts, state).await?;
        let endpoint = parts
            .extensions
            .get::<MatchedPath>()
            .map(MatchedPath::as_str)
            .unwrap_or_else(|| parts.uri.path());
        enforce_rate_limit(state, &client, endpoint.trim_start_matches('/'))?;
        Ok(RateLimited(client))
    }
}

fn resolve_client_ip(peer: IpAddr, forwarded: Option<&str>, trusted_proxies: usize) -> IpAddr {
    if trusted_proxies == 0 {
        return peer;
    }
    forwarded
        .and_then(|value| {
            value
                .split(',')
                .map(str::trim)
                .rev()
                .nth(trusted_proxies - 1)
                .and_then(|entry| entry.parse::<IpAddr>().ok())
        })
        .unwrap_or(peer)
}

/// Hash an IP for logging so raw addresses never reach the logs.
pub fn ip_hash(ip: &IpAddr) -> String {
    let mut hasher = std::hash::DefaultHasher::new();
    ip.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

/// Count one request from `client` against `endpoint`'s sliding window.
///
/// Returns `RateLimited` with a whole-second retry hint when the window is full.
pub fn enforce_rate_limit(
    state: &AppState,
    client: &ClientAddr,
    endpoint: &str,
) -> Result<(), AppError> {
    let key = format!("{}:{}", endpoint, client.0);
    state
        .limiter
        .check(&key, state.clock.now_millis())
        .map_err(|retry_after| {
            tracing::warn!(
                action = "rate_limited",
                endpoint,
                ip_hash = %ip_hash(&client.0),
                "Rate limit exceeded"
            );
            AppError::RateLimited {
                retry_after_secs: retry_after.as_millis().div_ceil(1000) as u64,
            }
        })
}
