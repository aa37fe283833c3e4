//! Snapshot files on the local filesystem.
//!
//! File structure:
//! - `{data_dir}/pubkeys.json`: kid → public key
//! - `{data_dir}/sessions.json`: token → {kid, exp}
//! - `{data_dir}/shadow.jsonl`: one ingested frame per line
//!
//! Snapshots are replaced atomically (temp file, fsync, rename). The frame log
//! is append-only with no recovery of partially written lines.

use super::{PubkeySnapshot, SessionSnapshot, SnapshotStore, StorageError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const PUBKEYS_FILE: &str = "pubkeys.json";
const SESSIONS_FILE: &str = "sessions.json";
const FRAMES_FILE: &str = "shadow.jsonl";

pub struct FileSnapshotStore {
    dir: PathBuf,
    // Serializes writers so concurrent saves cannot interleave temp files
    write_lock: Mutex<()>,
}

impl FileSnapshotStore {
    /// Open the store, creating the directory if it doesn't exist.
    pub async fn open(dir: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(dir).await?;
        Ok(Self {
            dir: dir.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    async fn read_json<T>(&self, name: &str) -> Result<T, StorageError>
    where
        T: DeserializeOwned + Default,
    {
        match fs::read(self.dir.join(name)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(value)?;
        let path = self.dir.join(name);
        let temp_path = path.with_extension("tmp");

        let _guard = self.write_lock.lock().await;
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        fs::rename(&temp_path, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    fn backend_name(&self) -> &'static str {
        "file"
    }

    async fn load_pubkeys(&self) -> Result<PubkeySnapshot, StorageError> {
        self.read_json(PUBKEYS_FILE).await
    }

    async fn save_pubkeys(&self, keys: &PubkeySnapshot) -> Result<(), StorageError> {
        self.write_json(PUBKEYS_FILE, keys).await
    }

    async fn load_sessions(&self) -> Result<SessionSnapshot, StorageError> {
        self.read_json(SESSIONS_FILE).await
    }

    async fn save_sessions(&self, sessions: &SessionSnapshot) -> Result<(), StorageError> {
        self.write_json(SESSIONS_FILE, sessions).await
    }

    async fn append_frame(&self, frame: &serde_json::Value) -> Result<(), StorageError> {
        let mut line = serde_json::to_vec(frame)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(FRAMES_FILE))
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}
