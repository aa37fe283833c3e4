//! In-process snapshot store. Nothing survives a restart.

use super::{PubkeySnapshot, SessionSnapshot, SnapshotStore, StorageError};
use async_trait::async_trait;
use parking_lot::Mutex;

#[derive(Default)]
pub struct MemorySnapshotStore {
    pubkeys: Mutex<PubkeySnapshot>,
    sessions: Mutex<SessionSnapshot>,
    frames: Mutex<Vec<serde_json::Value>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames appended so far, oldest first.
    pub fn frames(&self) -> Vec<serde_json::Value> {
        self.frames.lock().clone()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn load_pubkeys(&self) -> Result<PubkeySnapshot, StorageError> {
        Ok(self.pubkeys.lock().clone())
    }

    async fn save_pubkeys(&self, keys: &PubkeySnapshot) -> Result<(), StorageError> {
        *self.pubkeys.lock() = keys.clone();
        Ok(())
    }

    async fn load_sessions(&self) -> Result<SessionSnapshot, StorageError> {
        Ok(self.sessions.lock().clone())
    }

    async fn save_sessions(&self, sessions: &SessionSnapshot) -> Result<(), StorageError> {
        *self.sessions.lock() = sessions.clone();
        Ok(())
    }

    async fn append_frame(&self, frame: &serde_json::Value) -> Result<(), StorageError> {
        self.frames.lock().push(frame.clone());
        Ok(())
    }
}
