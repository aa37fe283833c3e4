//! Auth service: the stores, a clock and the persistence port behind one API.
//!
//! Route handlers call into this type and never touch the stores directly.
//! Every mutation of keys or sessions is followed by a best-effort snapshot
//! save; a failed save is logged and does not fail the operation.

use super::error::AuthError;
use super::keys::KeyRegistry;
use super::nonce::{Challenge, NonceStore};
use super::session::{Session, SessionStore};
use super::verify::{verify_assertion, Verified};
use crate::clock::Clock;
use crate::storage::SnapshotStore;
use std::sync::Arc;

pub struct AuthService {
    keys: KeyRegistry,
    nonces: NonceStore,
    sessions: SessionStore,
    clock: Arc<dyn Clock>,
    store: Arc<dyn SnapshotStore>,
    // Held across snapshot + save so saves land in mutation order
    persist_lock: tokio::sync::Mutex<()>,
}

/// Counts restored by [`AuthService::load_snapshots`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Restored {
    pub keys: usize,
    pub sessions: usize,
}

impl AuthService {
    pub fn new(
        nonce_ttl_secs: u64,
        session_ttl_secs: u64,
        clock: Arc<dyn Clock>,
        store: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            keys: KeyRegistry::new(),
            nonces: NonceStore::new(nonce_ttl_secs),
            sessions: SessionStore::new(session_ttl_secs),
            clock,
            store,
            persist_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn now(&self) -> u64 {
        self.clock.now_secs()
    }

    /// Issue a fresh challenge nonce bound to `aud`.
    pub fn challenge(&self, aud: &str) -> Challenge {
        self.nonces.issue(aud, self.now())
    }

    /// Verify a signed assertion and mint a session.
    pub async fn verify(&self, token: &str) -> Result<Verified, AuthError> {
        let verified = verify_assertion(token, &self.keys, &self.nonces, &self.sessions, self.now())?;
        self.persist_sessions().await;
        Ok(verified)
    }

    /// Register or replace the public key for `kid`.
    pub async fn register(&self, kid: &str, public_key: &str) -> Result<(), AuthError> {
        self.keys.register(kid, public_key)?;
        self.persist_keys().await;
        Ok(())
    }

    pub fn registered_kids(&self) -> Vec<String> {
        self.keys.kids()
    }

    /// Resolve a bearer token to its live session.
    pub fn authorize(&self, token: &str) -> Result<Session, AuthError> {
        self.sessions
            .validate(token, self.now())
            .ok_or(AuthError::Unauthorized)
    }

    /// Extend a live session. Returns the new expiry.
    pub async fn refresh(&self, token: &str) -> Result<u64, AuthError> {
        let exp = self.sessions.refresh(token, self.now())?;
        self.persist_sessions().await;
        Ok(exp)
    }

    /// Revoke a session. Returns whether one existed; callers report success either way.
    pub async fn logout(&self, token: &str) -> bool {
        let removed = self.sessions.revoke(token);
        if removed {
            self.persist_sessions().await;
        }
        removed
    }

    /// Drop expired nonces. Returns how many were removed.
    pub fn purge_expired_nonces(&self) -> usize {
        self.nonces.purge_expired(self.now())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn pending_nonces(&self) -> usize {
        self.nonces.len()
    }

    /// Restore keys and sessions from the persistence port.
    ///
    /// Load failures are logged and leave the corresponding store empty.
    pub async fn load_snapshots(&self) -> Restored {
        let mut restored = Restored::default();

        match self.store.load_pubkeys().await {
            Ok(entries) => restored.keys = self.keys.restore(entries),
            Err(e) => tracing::warn!(
                backend = self.store.backend_name(),
                error = %e,
                "Failed to load key snapshot"
            ),
        }

        match self.store.load_sessions().await {
            Ok(records) => restored.sessions = self.sessions.restore(records, self.now()),
            Err(e) => tracing::warn!(
                backend = self.store.backend_name(),
                error = %e,
                "Failed to load session snapshot"
            ),
        }

        restored
    }

    async fn persist_keys(&self) {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.keys.snapshot();
        if let Err(e) = self.store.save_pubkeys(&snapshot).await {
            tracing::warn!(
                backend = self.store.backend_name(),
                error = %e,
                "Failed to persist key snapshot"
            );
        }
    }

    async fn persist_sessions(&self) {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.sessions.snapshot(self.now());
        if let Err(e) = self.store.save_sessions(&snapshot).await {
            tracing::warn!(
                backend = self.store.backend_name(),
                error = %e,
                "Failed to persist session snapshot"
            );
        }
    }
}
