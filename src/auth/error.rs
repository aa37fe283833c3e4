//! Failure kinds of the challenge-response protocol and session lifecycle.

/// Closed set of authentication failures.
///
/// Every variant maps to a stable kebab-case tag via [`AuthError::reason`],
/// which is what clients branch on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Malformed assertion: {0}")]
    BadFormat(String),

    #[error("Unsupported algorithm: {0}")]
    AlgNotSupported(String),

    #[error("Unknown key id: {0}")]
    UnknownKid(String),

    #[error("Signature verification failed")]
    BadSignature,

    #[error("Assertion timestamp outside the accepted window")]
    StaleTimestamp,

    #[error("Missing claim: {0}")]
    MissingClaims(&'static str),

    #[error("Nonce not issued or already used")]
    NonceUnknown,

    #[error("Nonce expired")]
    NonceExpired,

    #[error("Nonce was issued for a different audience")]
    AudienceMismatch,

    #[error("Invalid public key: {0}")]
    BadPubkey(String),

    #[error("Session missing or expired")]
    Unauthorized,
}

impl AuthError {
    /// Wire tag reported to clients as `reason`.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::BadFormat(_) => "bad-format",
            AuthError::AlgNotSupported(_) => "alg-not-supported",
            AuthError::UnknownKid(_) => "unknown-kid",
            AuthError::BadSignature => "bad-signature",
            AuthError::StaleTimestamp => "stale-ts",
            AuthError::MissingClaims(_) => "missing-claims",
            AuthError::NonceUnknown => "nonce-unknown",
            AuthError::NonceExpired => "nonce-expired",
            AuthError::AudienceMismatch => "aud-mismatch",
            AuthError::BadPubkey(_) => "bad-pubkey",
            AuthError::Unauthorized => "unauthorized",
        }
    }

    /// Whether the failure is the caller's malformed input rather than a
    /// rejected credential.
    pub fn is_client_format(&self) -> bool {
        matches!(
            self,
            AuthError::BadFormat(_)
                | AuthError::AlgNotSupported(_)
                | AuthError::MissingClaims(_)
                | AuthError::BadPubkey(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_tags() {
        assert_eq!(AuthError::BadFormat("x".into()).reason(), "bad-format");
        assert_eq!(AuthError::UnknownKid("k".into()).reason(), "unknown-kid");
        assert_eq!(AuthError::StaleTimestamp.reason(), "stale-ts");
        assert_eq!(AuthError::NonceExpired.reason(), "nonce-expired");
        assert_eq!(AuthError::Unauthorized.reason(), "unauthorized");
    }

    #[test]
    fn test_client_format_split() {
        assert!(AuthError::MissingClaims("aud").is_client_format());
        assert!(AuthError::BadPubkey("short".into()).is_client_format());
        assert!(!AuthError::BadSignature.is_client_format());
        assert!(!AuthError::NonceUnknown.is_client_format());
    }
}
