//! Ed25519 signature verification and the challenge-response protocol.

use crate::auth::assertion::{self, Claims, ALG_EDDSA};
use crate::auth::error::AuthError;
use crate::auth::keys::KeyRegistry;
use crate::auth::nonce::NonceStore;
use crate::auth::session::{Session, SessionStore};
use ed25519_dalek::{Signature, VerifyingKey};
use serde::Serialize;

/// Verify an Ed25519 signature over `message`.
///
/// Signatures of the wrong length are rejected like any other mismatch.
/// Uses `verify_strict`, which also refuses small-order keys and
/// non-canonical signatures.
pub fn verify_signature(
    key: &VerifyingKey,
    message: &[u8],
    signature: &[u8],
) -> Result<(), AuthError> {
    let signature_array: [u8; 64] = signature
        .try_into()
        .map_err(|_| AuthError::BadSignature)?;
    let signature = Signature::from_bytes(&signature_array);

    key.verify_strict(message, &signature)
        .map_err(|_| AuthError::BadSignature)
}

/// Claims of an assertion that passed every check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedClaims {
    pub aud: String,
    pub nonce: String,
    pub ts: i64,
}

/// Outcome of a successful verification.
#[derive(Debug, Clone)]
pub struct Verified {
    pub kid: String,
    pub claims: VerifiedClaims,
    pub session: Session,
}

/// Run the verification protocol against the given stores.
///
/// Steps, each terminal on failure:
/// 1. parse the three segments
/// 2. require `alg = EdDSA`
/// 3. resolve the kid
/// 4. check the signature over `header.payload`
/// 5. require `ts` within `nonce_ttl` of `now`
/// 6. require non-empty `aud` and `nonce`
/// 7. consume the nonce (the commit point) and match its audience
/// 8. mint a session
///
/// Nothing is mutated before step 7, so every earlier failure leaves the
/// stores untouched and a replayed assertion fails at step 7.
pub fn verify_assertion(
    token: &str,
    registry: &KeyRegistry,
    nonces: &NonceStore,
    sessions: &SessionStore,
    now: u64,
) -> Result<Verified, AuthError> {
    let parsed = assertion::parse(token)?;

    if parsed.header.alg != ALG_EDDSA {
        return Err(AuthError::AlgNotSupported(parsed.header.alg));
    }

    let kid = parsed.header.kid;
    let key = registry
        .lookup(&kid)
        .ok_or_else(|| AuthError::UnknownKid(kid.clone()))?;

    verify_signature(&key, parsed.signing_input.as_bytes(), &parsed.signature)?;

    let claims = check_claims(parsed.claims, now, nonces.ttl_secs())?;

    let challenge = nonces.consume(&claims.nonce, now)?;
    if challenge.aud != claims.aud {
        return Err(AuthError::AudienceMismatch);
    }

    let session = sessions.mint(&kid, now);

    Ok(Verified {
        kid,
        claims,
        session,
    })
}

fn check_claims(claims: Claims, now: u64, window_secs: u64) -> Result<VerifiedClaims, AuthError> {
    let ts = claims.ts.ok_or(AuthError::MissingClaims("ts"))?;
    if (now as i64).abs_diff(ts) > window_secs {
        return Err(AuthError::StaleTimestamp);
    }

    let aud = claims
        .aud
        .filter(|aud| !aud.is_empty())
        .ok_or(AuthError::MissingClaims("aud"))?;
    let nonce = claims
        .nonce
        .filter(|nonce| !nonce.is_empty())
        .ok_or(AuthError::MissingClaims("nonce"))?;

    Ok(VerifiedClaims { aud, nonce, ts })
}
