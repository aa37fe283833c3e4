//! Deterministic client key derivation.
//!
//! A client key is derived from `kid + passphrase` with Argon2id, so a
//! device (or the CLI) can recreate its signing key without storing it.
//! Parameters: m=19456 KiB, t=2, p=1, salt = kid padded with NUL to at least
//! 8 bytes.

use crate::auth::assertion::{sign_assertion, Claims};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ed25519_dalek::SigningKey;
use zeroize::Zeroizing;

const ARGON2_MEMORY_KIB: u32 = 19_456;
const ARGON2_ITERATIONS: u32 = 2;
const ARGON2_PARALLELISM: u32 = 1;
const MIN_SALT_LEN: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum KeygenError {
    #[error("Argon2 params: {0}")]
    Params(argon2::Error),

    #[error("Argon2 hash: {0}")]
    Hash(argon2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn salt_for(kid: &str) -> Vec<u8> {
    let mut salt = kid.as_bytes().to_vec();
    if salt.len() < MIN_SALT_LEN {
        salt.resize(MIN_SALT_LEN, 0);
    }
    salt
}

/// Derive the Ed25519 signing key for `kid` from `passphrase`.
pub fn derive_signing_key(kid: &str, passphrase: &str) -> Result<SigningKey, KeygenError> {
    let params = Params::new(
        ARGON2_MEMORY_KIB,
        ARGON2_ITERATIONS,
        ARGON2_PARALLELISM,
        Some(32),
    )
    .map_err(KeygenError::Params)?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut seed = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(passphrase.as_bytes(), &salt_for(kid), seed.as_mut_slice())
        .map_err(KeygenError::Hash)?;

    Ok(SigningKey::from_bytes(&seed))
}

/// Base64url public key for registration via `/admin/register_pubkey`.
pub fn public_key_b64(key: &SigningKey) -> String {
    URL_SAFE_NO_PAD.encode(key.verifying_key().as_bytes())
}

/// Derive the key and sign a `{aud, nonce, ts}` assertion with it.
pub fn sign_challenge(
    kid: &str,
    passphrase: &str,
    aud: &str,
    nonce: &str,
    ts: i64,
) -> Result<String, KeygenError> {
    let key = derive_signing_key(kid, passphrase)?;
    Ok(sign_assertion(&key, kid, &Claims::new(aud, nonce, ts))?)
}
