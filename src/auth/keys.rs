//! Registry of client Ed25519 public keys, keyed by kid.

use crate::auth::error::AuthError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ed25519_dalek::VerifyingKey;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// Longest accepted key identifier.
pub const MAX_KID_LEN: usize = 128;

/// Check a key identifier: 1-128 chars of `[A-Za-z0-9._:-]`.
pub fn is_valid_kid(kid: &str) -> bool {
    !kid.is_empty()
        && kid.len() <= MAX_KID_LEN
        && kid
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '-'))
}

/// Decode a base64url (padding tolerated) Ed25519 public key.
pub fn decode_public_key(encoded: &str) -> Result<VerifyingKey, AuthError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded.trim().trim_end_matches('='))
        .map_err(|e| AuthError::BadPubkey(format!("invalid base64url: {}", e)))?;

    let array: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
        AuthError::BadPubkey(format!(
            "expected 32 bytes (Ed25519 public key), got {}",
            bytes.len()
        ))
    })?;

    VerifyingKey::from_bytes(&array).map_err(|e| AuthError::BadPubkey(e.to_string()))
}

/// kid → public key. No versioning; re-registration overwrites.
#[derive(Default)]
pub struct KeyRegistry {
    keys: RwLock<HashMap<String, VerifyingKey>>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the key for `kid`.
    pub fn register(&self, kid: &str, public_key: &str) -> Result<(), AuthError> {
        let key = decode_public_key(public_key)?;
        self.keys.write().insert(kid.to_string(), key);
        Ok(())
    }

    pub fn lookup(&self, kid: &str) -> Option<VerifyingKey> {
        self.keys.read().get(kid).copied()
    }

    /// Registered kids in sorted order.
    pub fn kids(&self) -> Vec<String> {
        let mut kids: Vec<String> = self.keys.read().keys().cloned().collect();
        kids.sort();
        kids
    }

    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// kid → base64url public key, as persisted.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.keys
            .read()
            .iter()
            .map(|(kid, key)| (kid.clone(), URL_SAFE_NO_PAD.encode(key.as_bytes())))
            .collect()
    }

    /// Load persisted keys. Entries that fail validation are skipped and
    /// logged. Returns the number restored.
    pub fn restore(&self, entries: BTreeMap<String, String>) -> usize {
        let mut restored = 0;
        for (kid, encoded) in entries {
            if !is_valid_kid(&kid) {
                tracing::warn!(kid = %kid, "Skipping persisted key with invalid kid");
                continue;
            }
            match self.register(&kid, &encoded) {
                Ok(()) => restored += 1,
                Err(e) => tracing::warn!(kid = %kid, error = %e, "Skipping invalid persisted key"),
            }
        }
        restored
    }
}
