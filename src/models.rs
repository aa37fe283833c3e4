//! Request and response models for the API.
//!
//! Every success body carries `"ok": true`; failures are rendered by
//! [`crate::error::AppError`].

use crate::alerts::{AlertGroup, BufferedAlert, ScoredGroup};
use crate::auth::verify::VerifiedClaims;
use serde::{Deserialize, Serialize};

// ============================================================================
// Auth Models
// ============================================================================

/// Query for `GET /auth/challenge`.
#[derive(Debug, Deserialize)]
pub struct ChallengeQuery {
    pub aud: Option<String>,
}

/// Issued challenge. `ts` is the issue time, `exp` the nonce deadline.
#[derive(Debug, Serialize)]
pub struct ChallengeResponse {
    pub ok: bool,
    pub nonce: String,
    pub aud: String,
    pub ts: u64,
    pub exp: u64,
}

/// Request to verify a signed assertion.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub jws: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub ok: bool,
    pub kid: String,
    pub payload: VerifiedClaims,
    pub session: String,
    pub exp: u64,
}

#[derive(Debug, Serialize)]
pub struct HelloResponse {
    pub ok: bool,
    pub kid: String,
    pub exp: u64,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub ok: bool,
    pub exp: u64,
}

/// Bare acknowledgement.
#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

// ============================================================================
// Admin Models
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterPubkeyRequest {
    pub kid: String,
    #[serde(rename = "pub")]
    pub public_key: String,
}

/// Registered kids, sorted.
#[derive(Debug, Serialize)]
pub struct RegisteredResponse {
    pub ok: bool,
    pub registered: Vec<String>,
}

// ============================================================================
// Shadow Models
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ShadowIngestRequest {
    pub frame: serde_json::Value,
    /// Overrides `SHADOW_LOG` for this frame.
    #[serde(default)]
    pub log: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ShadowIngestResponse {
    pub ok: bool,
    pub delivered: usize,
    pub logged: bool,
}

// ============================================================================
// Alert Models
// ============================================================================

#[derive(Debug, Serialize)]
pub struct AlertIngestResponse {
    pub ok: bool,
    pub group: AlertGroup,
    pub score: f64,
}

#[derive(Debug, Deserialize)]
pub struct AlertListQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct AlertListResponse {
    pub ok: bool,
    pub items: Vec<ScoredGroup>,
}

#[derive(Debug, Serialize)]
pub struct AlertBufferResponse {
    pub ok: bool,
    pub items: Vec<BufferedAlert>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    pub fp: String,
}

#[derive(Debug, Serialize)]
pub struct AlertHealthResponse {
    pub ok: bool,
    pub groups: usize,
    pub buffer: usize,
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub subscribers: usize,
    pub storage: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_uses_pub_field() {
        let req: RegisterPubkeyRequest =
            serde_json::from_str(r#"{"kid": "phone", "pub": "AAAA"}"#).unwrap();
        assert_eq!(req.kid, "phone");
        assert_eq!(req.public_key, "AAAA");
    }

    #[test]
    fn test_shadow_log_flag_is_optional() {
        let req: ShadowIngestRequest =
            serde_json::from_str(r#"{"frame": {"cpu": 0.4}}"#).unwrap();
        assert_eq!(req.log, None);
        assert_eq!(req.frame["cpu"], 0.4);

        let req: ShadowIngestRequest =
            serde_json::from_str(r#"{"frame": "tick", "log": false}"#).unwrap();
        assert_eq!(req.log, Some(false));
    }

    #[test]
    fn test_verify_response_shape() {
        let resp = VerifyResponse {
            ok: true,
            kid: "phone".to_string(),
            payload: VerifiedClaims {
                aud: "mobile".to_string(),
                nonce: "n".to_string(),
                ts: 10,
            },
            session: "tok".to_string(),
            exp: 910,
        };
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(value["payload"]["aud"], "mobile");
        assert_eq!(value["session"], "tok");
        assert_eq!(value["exp"], 910);
    }
}
