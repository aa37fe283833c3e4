//! Redis snapshot store.
//!
//! Redis key patterns:
//! - `guardian:pubkeys`: hash, kid → public key
//! - `guardian:sessions`: hash, token → session record (JSON)
//! - `guardian:shadow`: list of frames (JSON), newest last, capped
//!
//! Snapshot saves replace the whole hash inside a MULTI/EXEC block, so a
//! reader never sees a half-written snapshot.

use super::{PubkeySnapshot, SessionSnapshot, SnapshotStore, StorageError};
use crate::auth::session::SessionRecord;
use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashMap;

const PUBKEYS_KEY: &str = "guardian:pubkeys";
const SESSIONS_KEY: &str = "guardian:sessions";
const FRAMES_KEY: &str = "guardian:shadow";

/// Frames kept in the list before the oldest are trimmed.
const FRAMES_CAP: isize = 10_000;

pub struct RedisSnapshotStore {
    client: redis::Client,
}

impl RedisSnapshotStore {
    /// Open a client and check the server is reachable.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let client = redis::Client::open(url)?;
        let mut con = client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut con).await?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, StorageError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    async fn replace_hash(&self, key: &str, fields: Vec<(String, String)>) -> Result<(), StorageError> {
        let mut con = self.connection().await?;
        let mut pipe = redis::pipe();
        pipe.atomic().del(key).ignore();
        if !fields.is_empty() {
            pipe.hset_multiple(key, &fields).ignore();
        }
        let _: () = pipe.query_async(&mut con).await?;
        Ok(())
    }
}

fn encode_sessions(sessions: &SessionSnapshot) -> Result<Vec<(String, String)>, StorageError> {
    sessions
        .iter()
        .map(|(token, record)| Ok((token.clone(), serde_json::to_string(record)?)))
        .collect()
}

fn decode_sessions(raw: HashMap<String, String>) -> SessionSnapshot {
    raw.into_iter()
        .filter_map(|(token, json)| match serde_json::from_str::<SessionRecord>(&json) {
            Ok(record) => Some((token, record)),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable session record");
                None
            }
        })
        .collect()
}

#[async_trait]
impl SnapshotStore for RedisSnapshotStore {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn load_pubkeys(&self) -> Result<PubkeySnapshot, StorageError> {
        let mut con = self.connection().await?;
        let raw: HashMap<String, String> = con.hgetall(PUBKEYS_KEY).await?;
        Ok(raw.into_iter().collect())
    }

    async fn save_pubkeys(&self, keys: &PubkeySnapshot) -> Result<(), StorageError> {
        let fields = keys
            .iter()
            .map(|(kid, key)| (kid.clone(), key.clone()))
            .collect();
        self.replace_hash(PUBKEYS_KEY, fields).await
    }

    async fn load_sessions(&self) -> Result<SessionSnapshot, StorageError> {
        let mut con = self.connection().await?;
        let raw: HashMap<String, String> = con.hgetall(SESSIONS_KEY).await?;
        Ok(decode_sessions(raw))
    }

    async fn save_sessions(&self, sessions: &SessionSnapshot) -> Result<(), StorageError> {
        let fields = encode_sessions(sessions)?;
        self.replace_hash(SESSIONS_KEY, fields).await
    }

    async fn append_frame(&self, frame: &serde_json::Value) -> Result<(), StorageError> {
        let json = serde_json::to_string(frame)?;
        let mut con = self.connection().await?;
        let _: () = redis::pipe()
            .atomic()
            .rpush(FRAMES_KEY, json)
            .ignore()
            .ltrim(FRAMES_KEY, -FRAMES_CAP, -1)
            .ignore()
            .query_async(&mut con)
            .await?;
        Ok(())
    }
}
