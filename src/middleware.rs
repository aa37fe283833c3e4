//! Response hardening for the JSON and WebSocket surface.
//!
//! Nothing served here is meant to be rendered, framed or cached: every body
//! is either a token, a nonce or a status object.

use axum::{
    extract::Request,
    http::{header, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

/// Headers stamped onto every response, overriding anything a handler set.
pub const HARDENING_HEADERS: [(HeaderName, &str); 6] = [
    (header::CACHE_CONTROL, "no-store"),
    (header::REFERRER_POLICY, "no-referrer"),
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::X_FRAME_OPTIONS, "DENY"),
    (
        header::STRICT_TRANSPORT_SECURITY,
        "max-age=63072000; includeSubDomains",
    ),
    (
        header::CONTENT_SECURITY_POLICY,
        "default-src 'none'; frame-ancestors 'none'",
    ),
];

/// Apply [`HARDENING_HEADERS`], including on rejections and upgrades.
///
/// ```rust,no_run
/// use axum::{middleware, Router};
/// use mcm_guardian::middleware::security_headers;
///
/// let app: Router = Router::new().layer(middleware::from_fn(security_headers));
/// ```
pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    for (name, value) in HARDENING_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
    response
}
