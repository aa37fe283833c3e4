//! Compact signed assertions: `b64url(header).b64url(payload).b64url(signature)`.
//!
//! The header names the algorithm and key id, the payload carries the
//! audience, nonce and issue time. The signature covers the first two
//! segments exactly as transmitted.

use crate::auth::error::AuthError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ed25519_dalek::{Signer, SigningKey};
use serde::{Deserialize, Serialize};

/// The only accepted `alg` value.
pub const ALG_EDDSA: &str = "EdDSA";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Header {
    pub alg: String,
    pub kid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
}

/// Assertion claims.
///
/// Fields are optional at parse time so that a missing claim is reported as
/// `MissingClaims` after the signature has been checked, not as a format error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
}

impl Claims {
    pub fn new(aud: &str, nonce: &str, ts: i64) -> Self {
        Self {
            aud: Some(aud.to_string()),
            nonce: Some(nonce.to_string()),
            ts: Some(ts),
        }
    }
}

/// A structurally valid, not yet verified assertion.
#[derive(Debug, Clone)]
pub struct ParsedAssertion {
    pub header: Header,
    pub claims: Claims,
    /// `header.payload` as received; the bytes the signature covers.
    pub signing_input: String,
    pub signature: Vec<u8>,
}

fn decode_segment(segment: &str, label: &str) -> Result<Vec<u8>, AuthError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| AuthError::BadFormat(format!("{} is not base64url: {}", label, e)))
}

/// Split and decode an assertion. Signature and claims are not checked here.
pub fn parse(token: &str) -> Result<ParsedAssertion, AuthError> {
    let mut parts = token.trim().split('.');
    let (header_b64, payload_b64, signature_b64) =
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(p), Some(s), None) if !h.is_empty() && !p.is_empty() && !s.is_empty() => {
                (h, p, s)
            }
            _ => {
                return Err(AuthError::BadFormat(
                    "expected three non-empty segments".to_string(),
                ))
            }
        };

    let header: Header = serde_json::from_slice(&decode_segment(header_b64, "header")?)
        .map_err(|e| AuthError::BadFormat(format!("header: {}", e)))?;
    let claims: Claims = serde_json::from_slice(&decode_segment(payload_b64, "payload")?)
        .map_err(|e| AuthError::BadFormat(format!("payload: {}", e)))?;
    let signature = decode_segment(signature_b64, "signature")?;

    Ok(ParsedAssertion {
        header,
        claims,
        signing_input: format!("{}.{}", header_b64, payload_b64),
        signature,
    })
}

/// Produce a compact assertion signed with `signing_key`.
pub fn sign_assertion(
    signing_key: &SigningKey,
    kid: &str,
    claims: &Claims,
) -> Result<String, serde_json::Error> {
    let header = Header {
        alg: ALG_EDDSA.to_string(),
        kid: kid.to_string(),
        typ: None,
    };
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);
    let payload_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
    let signing_input = format!("{}.{}", header_b64, payload_b64);
    let signature = signing_key.sign(signing_input.as_bytes());

    Ok(format!(
        "{}.{}",
        signing_input,
        URL_SAFE_NO_PAD.encode(signature.to_bytes())
    ))
}
