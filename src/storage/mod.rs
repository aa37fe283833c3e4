//! Persistence port for best-effort snapshots.
//!
//! The auth core never touches storage directly: the service hands complete
//! snapshots of the key registry and the session store to a [`SnapshotStore`]
//! after each mutation, and loads them back once at startup. Ingested shadow
//! frames are appended to a JSON-lines log through the same port.
//!
//! Backends:
//! - [`memory::MemorySnapshotStore`] keeps the last snapshot in process memory
//! - [`file::FileSnapshotStore`] writes `pubkeys.json`, `sessions.json` and
//!   `shadow.jsonl` under a data directory
//! - [`redis_store::RedisSnapshotStore`] keeps the same data under `guardian:*` keys

pub mod file;
pub mod memory;
pub mod redis_store;

use crate::auth::session::SessionRecord;
use crate::config::{Config, StorageBackend};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// kid → base64url public key.
pub type PubkeySnapshot = BTreeMap<String, String>;

/// session token → record.
pub type SessionSnapshot = BTreeMap<String, SessionRecord>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Short name for logs and the health endpoint.
    fn backend_name(&self) -> &'static str;

    async fn load_pubkeys(&self) -> Result<PubkeySnapshot, StorageError>;

    async fn save_pubkeys(&self, keys: &PubkeySnapshot) -> Result<(), StorageError>;

    async fn load_sessions(&self) -> Result<SessionSnapshot, StorageError>;

    async fn save_sessions(&self, sessions: &SessionSnapshot) -> Result<(), StorageError>;

    /// Append one frame to the frame log.
    async fn append_frame(&self, frame: &serde_json::Value) -> Result<(), StorageError>;
}

/// Build the backend selected in `config`.
pub async fn open(config: &Config) -> Result<Arc<dyn SnapshotStore>, StorageError> {
    let store: Arc<dyn SnapshotStore> = match config.storage_backend {
        StorageBackend::Memory => Arc::new(memory::MemorySnapshotStore::new()),
        StorageBackend::File => Arc::new(file::FileSnapshotStore::open(&config.data_dir).await?),
        StorageBackend::Redis => {
            // Config validation guarantees the URL is present for this backend
            let url = config.redis_url.as_deref().unwrap_or_default();
            Arc::new(redis_store::RedisSnapshotStore::connect(url).await?)
        }
    };
    Ok(store)
}
