//! Alert coalescer endpoints.

use super::{ApiJson, ApiQuery};
use crate::alerts::{AlertIn, LIST_LIMIT_DEFAULT, LIST_LIMIT_MAX};
use crate::auth::middleware::{AppState, RateLimited};
use crate::error::AppError;
use crate::live::LiveEvent;
use crate::models::{
    AlertBufferResponse, AlertHealthResponse, AlertIngestResponse, AlertListQuery,
    AlertListResponse, OkResponse, ResolveQuery,
};
use axum::{extract::State, Json};

/// POST /alerts/ingest: Record an alert and publish its group
pub async fn ingest(
    State(state): State<AppState>,
    _limit: RateLimited,
    ApiJson(alert): ApiJson<AlertIn>,
) -> Result<Json<AlertIngestResponse>, AppError> {
    if alert.source.trim().is_empty() || alert.kind.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Alert source and kind are required".to_string(),
        ));
    }

    let now = state.now();
    let group = state.alerts.ingest(alert, now);
    let score = group.score(now);
    tracing::debug!(
        action = "alert_ingested",
        fp = %group.fp,
        count = group.count,
        "Alert coalesced"
    );

    state.live.emit(LiveEvent::Alert {
        group: group.clone(),
        score,
        ts: now,
    });

    Ok(Json(AlertIngestResponse {
        ok: true,
        group,
        score,
    }))
}

/// GET /alerts?limit=: Ranked alert groups, `limit` in 1..=200 (default 50)
pub async fn list(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<AlertListQuery>,
) -> Result<Json<AlertListResponse>, AppError> {
    let limit = query.limit.unwrap_or(LIST_LIMIT_DEFAULT);
    if !(1..=LIST_LIMIT_MAX).contains(&limit) {
        return Err(AppError::BadRequest(format!(
            "limit must be between 1 and {}",
            LIST_LIMIT_MAX
        )));
    }
    Ok(Json(AlertListResponse {
        ok: true,
        items: state.alerts.list(limit, state.now()),
    }))
}

/// GET /alerts/buffer: Raw alerts from the last few seconds
pub async fn buffer(State(state): State<AppState>) -> Json<AlertBufferResponse> {
    Json(AlertBufferResponse {
        ok: true,
        items: state.alerts.buffer(state.now()),
    })
}

/// POST /alerts/resolve?fp=: Close a group
pub async fn resolve(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ResolveQuery>,
) -> Result<Json<OkResponse>, AppError> {
    if !state.alerts.resolve(query.fp.trim()) {
        return Err(AppError::NotFound("Unknown alert group".to_string()));
    }
    tracing::info!(action = "alert_resolved", fp = %query.fp, "Alert group resolved");
    Ok(Json(OkResponse { ok: true }))
}

/// GET /alerts/health: Coalescer counters
pub async fn health(State(state): State<AppState>) -> Json<AlertHealthResponse> {
    let stats = state.alerts.stats(state.now());
    Json(AlertHealthResponse {
        ok: true,
        groups: stats.groups,
        buffer: stats.buffer,
    })
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
    use std::time::Duration;
    use tower::ServiceExt;

    fn setup() -> (Router, AppState, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_secs(10_000));
        let state = AppState::new(
            Config::default(),
            clock.clone(),
            Arc::new(MemorySnapshotStore::new()),
        );
        let router = app(state.clone())
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
        (router, state, clock)
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn post_alert(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/alerts/ingest")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_ingest_coalesces_and_lists() {
        let (router, _, clock) = setup();
        let alert = json!({"source": "api", "kind": "5xx", "message": "upstream down"});

        let (status, body) = send(&router, post_alert(alert.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["group"]["count"], 1);
        assert_eq!(body["group"]["severity"], "warn");

        clock.advance(Duration::from_secs(5));
        let (_, body) = send(&router, post_alert(alert)).await;
        assert_eq!(body["group"]["count"], 2);
        let fp = body["group"]["fp"].as_str().unwrap().to_string();

        send(
            &router,
            post_alert(json!({"source": "db", "kind": "slow", "message": "p99", "severity": "info"})),
        )
        .await;

        let (status, body) = send(&router, get("/alerts?limit=10")).await;
        assert_eq!(status, StatusCode::OK);
        let items = body["items"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["fp"], fp);
        assert!(items[0]["score"].as_f64().unwrap() > items[1]["score"].as_f64().unwrap());

        let (_, body) = send(&router, get("/alerts/buffer")).await;
        assert_eq!(body["items"].as_array().unwrap().len(), 3);

        let (_, body) = send(&router, get("/alerts/health")).await;
        assert_eq!(body, json!({"ok": true, "groups": 2, "buffer": 3}));
    }

    #[tokio::test]
    async fn test_resolve() {
        let (router, _, _) = setup();
        let (_, body) = send(
            &router,
            post_alert(json!({"source": "api", "kind": "5xx", "message": "m", "fingerprint": "api-5xx"})),
        )
        .await;
        assert_eq!(body["group"]["fp"], "api-5xx");

        let resolve = || {
            Request::builder()
                .method("POST")
                .uri("/alerts/resolve?fp=api-5xx")
                .body(Body::empty())
                .unwrap()
        };
        let (status, body) = send(&router, resolve()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ok": true}));

        let (status, body) = send(&router, resolve()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["reason"], "not-found");
    }

    #[tokio::test]
    async fn test_list_limit_out_of_range() {
        let (router, _, _) = setup();
        for uri in ["/alerts?limit=0", "/alerts?limit=201", "/alerts?limit=1000"] {
            let (status, body) = send(&router, get(uri)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert_eq!(body, json!({"ok": false, "reason": "bad-request"}));
        }

        let (status, _) = send(&router, get("/alerts?limit=200")).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&router, get("/alerts?limit=1")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ingest_validation() {
        let (router, _, _) = setup();
        let (status, body) =
            send(&router, post_alert(json!({"source": " ", "kind": "x", "message": "m"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["reason"], "bad-request");

        let (status, _) = send(
            &router,
            post_alert(json!({"source": "a", "kind": "b", "message": "m", "severity": "fatal"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_ingest_publishes_alert_event() {
        let (router, state, _) = setup();
        let mut sub = state.live.connect();

        send(
            &router,
            post_alert(json!({"source": "api", "kind": "5xx", "message": "m", "severity": "crit"})),
        )
        .await;

        let event: Value = serde_json::from_str(&sub.receiver.recv().await.unwrap()).unwrap();
        assert_eq!(event["type"], "alert");
        assert_eq!(event["group"]["severity"], "crit");
        assert_eq!(event["score"], 10.0 * 30.0);
    }
}
