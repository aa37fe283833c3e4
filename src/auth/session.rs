//! Token generation and the in-memory bearer session store.

use crate::auth::error::AuthError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Generate a cryptographically random session token.
///
/// Returns a base64url string (43 characters, no padding) from 32 random bytes.
pub fn generate_session_token() -> String {
    let mut rng = rand::rng();
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a cryptographically random challenge nonce.
///
/// Same shape as a session token but drawn independently.
pub fn generate_challenge_nonce() -> String {
    let mut rng = rand::rng();
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// A live bearer session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub kid: String,
    pub expires_at: u64,
}

/// Session data as handed to the persistence port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub kid: String,
    pub exp: u64,
}

/// Bearer sessions keyed by opaque token.
///
/// Expiry is lazy: an expired session is removed when it is next looked up.
pub struct SessionStore {
    ttl_secs: u64,
    sessions: Mutex<HashMap<String, SessionRecord>>,
}

impl SessionStore {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl_secs,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Create a session for `kid` expiring `ttl` seconds after `now`.
    pub fn mint(&self, kid: &str, now: u64) -> Session {
        let token = generate_session_token();
        let expires_at = now.saturating_add(self.ttl_secs);
        self.sessions.lock().insert(
            token.clone(),
            SessionRecord {
                kid: kid.to_string(),
                exp: expires_at,
            },
        );
        Session {
            token,
            kid: kid.to_string(),
            expires_at,
        }
    }

    /// Look up a session, deleting it if it has expired.
    pub fn validate(&self, token: &str, now: u64) -> Option<Session> {
        let mut sessions = self.sessions.lock();
        let record = sessions.get(token)?;
        if now >= record.exp {
            sessions.remove(token);
            return None;
        }
        Some(Session {
            token: token.to_string(),
            kid: record.kid.clone(),
            expires_at: record.exp,
        })
    }

    /// Push the expiry of a currently valid session to `now + ttl`.
    pub fn refresh(&self, token: &str, now: u64) -> Result<u64, AuthError> {
        let mut sessions = self.sessions.lock();
        let record = sessions.get_mut(token).ok_or(AuthError::Unauthorized)?;
        if now >= record.exp {
            sessions.remove(token);
            return Err(AuthError::Unauthorized);
        }
        // A clock that stepped backwards must not shorten the session.
        record.exp = record.exp.max(now.saturating_add(self.ttl_secs));
        Ok(record.exp)
    }

    /// Remove a session. Returns whether anything was removed; callers treat
    /// both outcomes as success.
    pub fn revoke(&self, token: &str) -> bool {
        self.sessions.lock().remove(token).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live sessions only, ordered by token for stable output.
    pub fn snapshot(&self, now: u64) -> BTreeMap<String, SessionRecord> {
        self.sessions
            .lock()
            .iter()
            .filter(|(_, record)| record.exp > now)
            .map(|(token, record)| (token.clone(), record.clone()))
            .collect()
    }

    /// Load persisted sessions, skipping any that have already expired.
    /// Returns the number restored.
    pub fn restore(&self, records: BTreeMap<String, SessionRecord>, now: u64) -> usize {
        let mut sessions = self.sessions.lock();
        let mut restored = 0;
        for (token, record) in records {
            if record.exp > now {
                sessions.insert(token, record);
                restored += 1;
            }
        }
        restored
    }
}
