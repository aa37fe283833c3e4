//! Live event fan-out for real-time listeners.
//!
//! Each listener owns a bounded channel. A broadcast serializes the event
//! once and offers it to every channel in registration order; a listener
//! whose channel is closed or full is dropped from the set.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Frame published to listeners.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    Auth {
        event: AuthEventKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        kid: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        aud: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<&'static str>,
        ts: u64,
    },
    Alert {
        group: crate::alerts::AlertGroup,
        score: f64,
        ts: u64,
    },
    Shadow {
        frame: serde_json::Value,
        ts: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthEventKind {
    ChallengeIssued,
    VerifyOk,
    VerifyFailed,
    Refreshed,
    LoggedOut,
    KeyRegistered,
}

/// A listener's end of the feed.
pub struct Subscription {
    pub id: u64,
    pub receiver: mpsc::Receiver<Arc<str>>,
}

pub struct Broadcaster {
    capacity: usize,
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(u64, mpsc::Sender<Arc<str>>)>>,
}

impl Broadcaster {
    /// `capacity` is the per-listener queue depth.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn connect(&self) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().push((id, sender));
        tracing::debug!(subscriber = id, "Live listener connected");
        Subscription { id, receiver }
    }

    /// Remove a listener. Returns false if it was already gone.
    pub fn disconnect(&self, id: u64) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(sub_id, _)| *sub_id != id);
        before != subscribers.len()
    }

    /// Serialize `event` once and deliver it to every listener.
    ///
    /// Returns the number of listeners that accepted the frame.
    pub fn broadcast<T: Serialize>(&self, event: &T) -> Result<usize, serde_json::Error> {
        let frame: Arc<str> = Arc::from(serde_json::to_string(event)?);
        Ok(self.publish(frame))
    }

    /// Deliver an already serialized frame.
    pub fn publish(&self, frame: Arc<str>) -> usize {
        let mut subscribers = self.subscribers.lock();
        let mut delivered = 0;
        subscribers.retain(|(id, sender)| match sender.try_send(Arc::clone(&frame)) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(e) => {
                tracing::debug!(subscriber = *id, error = %e, "Dropping live listener");
                false
            }
        });
        delivered
    }

    /// Best-effort publish of a [`LiveEvent`]; serialization failures are logged.
    pub fn emit(&self, event: LiveEvent) -> usize {
        match self.broadcast(&event) {
            Ok(delivered) => delivered,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize live event");
                0
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_all_in_order() {
        let live = Broadcaster::new(8);
        let mut a = live.connect();
        let mut b = live.connect();
        assert!(a.id < b.id);

        let delivered = live.broadcast(&serde_json::json!({"n": 1})).unwrap();
        assert_eq!(delivered, 2);
        live.broadcast(&serde_json::json!({"n": 2})).unwrap();

        assert_eq!(&*a.receiver.recv().await.unwrap(), r#"{"n":1}"#);
        assert_eq!(&*a.receiver.recv().await.unwrap(), r#"{"n":2}"#);
        assert_eq!(&*b.receiver.recv().await.unwrap(), r#"{"n":1}"#);
    }

    #[tokio::test]
    async fn test_dropped_listener_is_pruned() {
        let live = Broadcaster::new(8);
        let a = live.connect();
        let _b = live.connect();
        drop(a);

        assert_eq!(live.subscriber_count(), 2);
        assert_eq!(live.broadcast(&"hello").unwrap(), 1);
        assert_eq!(live.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_full_listener_is_pruned() {
        let live = Broadcaster::new(1);
        let _slow = live.connect();

        assert_eq!(live.broadcast(&1).unwrap(), 1);
        // Queue full: listener is dropped instead of blocking the feed
        assert_eq!(live.broadcast(&2).unwrap(), 0);
        assert_eq!(live.subscriber_count(), 0);
    }

    #[test]
    fn test_disconnect() {
        let live = Broadcaster::new(4);
        let sub = live.connect();

        assert!(live.disconnect(sub.id));
        assert!(!live.disconnect(sub.id));
        assert_eq!(live.subscriber_count(), 0);
    }

    #[test]
    fn test_auth_event_shape() {
        let event = LiveEvent::Auth {
            event: AuthEventKind::VerifyFailed,
            kid: Some("phone".to_string()),
            aud: None,
            reason: Some("bad-signature"),
            ts: 42,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "auth",
                "event": "verify_failed",
                "kid": "phone",
                "reason": "bad-signature",
                "ts": 42
            })
        );
    }
}
