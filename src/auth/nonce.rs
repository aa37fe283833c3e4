//! Single-use challenge nonces.

use crate::auth::error::AuthError;
use crate::auth::session::generate_challenge_nonce;
use parking_lot::Mutex;
use std::collections::HashMap;

/// An issued challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub nonce: String,
    pub aud: String,
    pub issued_at: u64,
    pub expires_at: u64,
}

#[derive(Debug)]
struct Entry {
    aud: String,
    issued_at: u64,
    expires_at: u64,
}

/// Outstanding nonces keyed by value.
///
/// Lookup and removal in [`NonceStore::consume`] happen under one lock, so a
/// nonce is handed out as consumed to at most one caller.
pub struct NonceStore {
    ttl_secs: u64,
    entries: Mutex<HashMap<String, Entry>>,
}

impl NonceStore {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl_secs,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Issue a fresh nonce bound to `aud`.
    ///
    /// Expired entries are swept before the new one is stored.
    pub fn issue(&self, aud: &str, now: u64) -> Challenge {
        let nonce = generate_challenge_nonce();
        let expires_at = now.saturating_add(self.ttl_secs);

        let mut entries = self.entries.lock();
        entries.retain(|_, entry| now < entry.expires_at);
        entries.insert(
            nonce.clone(),
            Entry {
                aud: aud.to_string(),
                issued_at: now,
                expires_at,
            },
        );

        Challenge {
            nonce,
            aud: aud.to_string(),
            issued_at: now,
            expires_at,
        }
    }

    /// Consume a nonce. The entry is removed whether or not it had expired.
    pub fn consume(&self, nonce: &str, now: u64) -> Result<Challenge, AuthError> {
        let entry = self
            .entries
            .lock()
            .remove(nonce)
            .ok_or(AuthError::NonceUnknown)?;

        if now >= entry.expires_at {
            return Err(AuthError::NonceExpired);
        }

        Ok(Challenge {
            nonce: nonce.to_string(),
            aud: entry.aud,
            issued_at: entry.issued_at,
            expires_at: entry.expires_at,
        })
    }

    /// Drop every expired nonce. Returns how many were removed.
    pub fn purge_expired(&self, now: u64) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| now < entry.expires_at);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_issue_sets_expiry() {
        let store = NonceStore::new(300);
        let challenge = store.issue("mobile", 1_000);

        assert_eq!(challenge.aud, "mobile");
        assert_eq!(challenge.issued_at, 1_000);
        assert_eq!(challenge.expires_at, 1_300);
        assert_eq!(challenge.nonce.len(), 43);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_huge_ttl_saturates_instead_of_wrapping() {
        let store = NonceStore::new(u64::MAX);
        let challenge = store.issue("mobile", 1_700_000_000);
        assert_eq!(challenge.expires_at, u64::MAX);
        assert!(store.consume(&challenge.nonce, 1_700_000_001).is_ok());
    }

    #[test]
    fn test_consume_is_single_use() {
        let store = NonceStore::new(300);
        let challenge = store.issue("mobile", 1_000);

        let consumed = store.consume(&challenge.nonce, 1_001).unwrap();
        assert_eq!(consumed, challenge);

        assert_eq!(
            store.consume(&challenge.nonce, 1_002),
            Err(AuthError::NonceUnknown)
        );
    }

    #[test]
    fn test_consume_unknown() {
        let store = NonceStore::new(300);
        assert_eq!(store.consume("nope", 0), Err(AuthError::NonceUnknown));
    }

    #[test]
    fn test_consume_expired_removes_entry() {
        let store = NonceStore::new(300);
        let challenge = store.issue("mobile", 1_000);

        assert_eq!(
            store.consume(&challenge.nonce, 1_300),
            Err(AuthError::NonceExpired)
        );
        assert!(store.is_empty());
        assert_eq!(
            store.consume(&challenge.nonce, 1_000),
            Err(AuthError::NonceUnknown)
        );
    }

    #[test]
    fn test_issue_sweeps_expired() {
        let store = NonceStore::new(10);
        store.issue("a", 100);
        store.issue("b", 105);
        assert_eq!(store.len(), 2);

        // At 112 the first has expired, the second has not
        store.issue("c", 112);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_purge_expired() {
        let store = NonceStore::new(10);
        store.issue("a", 100);
        store.issue("b", 200);

        assert_eq!(store.purge_expired(150), 1);
        assert_eq!(store.purge_expired(150), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_concurrent_consume_single_winner() {
        let store = Arc::new(NonceStore::new(300));
        let challenge = store.issue("mobile", 0);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let nonce = challenge.nonce.clone();
                std::thread::spawn(move || store.consume(&nonce, 1).is_ok())
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
    }
}
