//! Live feed endpoints: the WebSocket stream and frame injection.

use super::ApiJson;
use crate::auth::middleware::{AppState, RateLimited};
use crate::error::AppError;
use crate::live::{Broadcaster, LiveEvent, Subscription};
use crate::models::{ShadowIngestRequest, ShadowIngestResponse};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    Json,
};
use futures_util::{SinkExt as _, StreamExt as _};
use std::sync::Arc;

/// GET /shadow/ws: Subscribe to the live feed
pub async fn live_socket(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let live = Arc::clone(&state.live);
    ws.on_upgrade(move |socket| stream_events(socket, live))
}

/// Forward broadcast frames to one socket until either side goes away.
///
/// Client messages are read only to notice a close; their content is ignored.
async fn stream_events(socket: WebSocket, live: Arc<Broadcaster>) {
    let Subscription { id, mut receiver } = live.connect();
    let (mut outgoing, mut incoming) = socket.split();

    loop {
        tokio::select! {
            frame = receiver.recv() => match frame {
                Some(frame) => {
                    if outgoing.send(Message::Text(frame.to_string().into())).await.is_err() {
                        break;
                    }
                }
                // Dropped by the broadcaster (queue full)
                None => break,
            },
            message = incoming.next() => match message {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    live.disconnect(id);
    tracing::debug!(subscriber = id, "Live listener disconnected");
}

/// POST /shadow/ingest: Broadcast an external frame, optionally logging it
pub async fn ingest(
    State(state): State<AppState>,
    _limit: RateLimited,
    ApiJson(req): ApiJson<ShadowIngestRequest>,
) -> Result<Json<ShadowIngestResponse>, AppError> {
    let log = req.log.unwrap_or(state.config.shadow_log);
    let logged = if log {
        match state.store.append_frame(&req.frame).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    backend = state.store.backend_name(),
                    error = %e,
                    "Failed to append shadow frame"
                );
                false
            }
        }
    } else {
        false
    };

    let delivered = state.live.emit(LiveEvent::Shadow {
        frame: req.frame,
        ts: state.now(),
    });

    Ok(Json(ShadowIngestResponse {
        ok: true,
        delivered,
        logged,
    }))
}

#[cfg(test)]
mod tests {
    use crate::auth::middleware::AppState;
    use crate::clock::ManualClock;
    use crate::config::Config;
    use crate::routes::app;
    use crate::storage::memory::MemorySnapshotStore;
    use axum::{
        body::Body,
        extract::connect_info::MockConnectInfo,
        http::{Request, StatusCode},
        Router,
    };
    use serde_json::{json, Value};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn setup(shadow_log: bool) -> (Router, AppState, Arc<MemorySnapshotStore>) {
        let store = Arc::new(MemorySnapshotStore::new());
        let config = Config {
            shadow_log,
            ..Config::default()
        };
        let state = AppState::new(config, Arc::new(ManualClock::at_secs(500)), store.clone());
        let router = app(state.clone())
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
        (router, state, store)
    }

    async fn ingest(router: &Router, body: Value) -> Value {
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/shadow/ingest")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_ingest_broadcasts_and_logs() {
        let (router, state, store) = setup(true);
        let mut sub = state.live.connect();

        let body = ingest(&router, json!({"frame": {"cpu": 0.5}})).await;
        assert_eq!(body, json!({"ok": true, "delivered": 1, "logged": true}));
        assert_eq!(store.frames(), vec![json!({"cpu": 0.5})]);

        let frame: Value = serde_json::from_str(&sub.receiver.recv().await.unwrap()).unwrap();
        assert_eq!(frame, json!({"type": "shadow", "frame": {"cpu": 0.5}, "ts": 500}));
    }

    #[tokio::test]
    async fn test_log_flag_overrides_default() {
        let (router, _, store) = setup(false);

        let body = ingest(&router, json!({"frame": "tick"})).await;
        assert_eq!(body["logged"], false);
        assert_eq!(body["delivered"], 0);

        let body = ingest(&router, json!({"frame": "tock", "log": true})).await;
        assert_eq!(body["logged"], true);
        assert_eq!(store.frames(), vec![json!("tock")]);
    }
}
