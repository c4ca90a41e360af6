use crate::monitor::{ColdStoreMonitor, LiveSnapshot};
use crate::persistence::PersistenceGateway;
use crate::stats::StatsSnapshot;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Upper bound on rows returned by `GET /history`.
pub const MAX_HISTORY_LIMIT: u32 = 20;

#[derive(Clone)]
pub struct HttpState {
    pub monitor: ColdStoreMonitor,
    pub gateway: Arc<dyn PersistenceGateway>,
    pub history_limit: u32,
}

#[derive(Debug, Serialize)]
struct IngestResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl IngestResponse {
    fn error(message: impl Into<String>) -> Response {
        let body = Self {
            status: "error",
            message: Some(message.into()),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub unit_id: i32,
    pub temperature: f64,
    pub humidity: Option<f64>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    #[serde(flatten)]
    stats: StatsSnapshot,
}

async fn healthz(State(state): State<HttpState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        stats: state.monitor.stats().snapshot(),
    })
}

/// Readings pushed over HTTP go through the same processor as transport readings, then to
/// storage.
async fn post_sensor_data(State(state): State<HttpState>, body: Bytes) -> Response {
    let mut payload = body.to_vec();
    let reading = match state.monitor.process_payload(&mut payload).await {
        Ok(processed) => processed.reading,
        Err(err) => {
            tracing::warn!(error=%err, "rejected pushed reading");
            return IngestResponse::error(err.to_string());
        }
    };

    if let Err(err) = state.gateway.insert(&reading).await {
        tracing::error!(error=%err, unit = reading.unit_id(), "failed to store pushed reading");
        state
            .monitor
            .stats()
            .record_persistence_failure(err.to_string());
        return IngestResponse::error(err.to_string());
    }

    Json(IngestResponse {
        status: "saved",
        message: None,
    })
    .into_response()
}

async fn get_history(State(state): State<HttpState>) -> (StatusCode, Json<Vec<HistoryEntry>>) {
    let limit = state.history_limit.clamp(1, MAX_HISTORY_LIMIT);
    match state.gateway.query_recent(limit).await {
        Ok(readings) => {
            let entries = readings
                .into_iter()
                .take(limit as usize)
                .map(|reading| HistoryEntry {
                    unit_id: reading.unit_id(),
                    temperature: reading.temperature(),
                    humidity: reading.humidity(),
                    timestamp: reading.timestamp().to_string(),
                })
                .collect();
            (StatusCode::OK, Json(entries))
        }
        Err(err) => {
            tracing::error!(error=%err, "history query failed");
            state
                .monitor
                .stats()
                .record_persistence_failure(err.to_string());
            (StatusCode::INTERNAL_SERVER_ERROR, Json(Vec::new()))
        }
    }
}

async fn get_live(State(state): State<HttpState>) -> Json<LiveSnapshot> {
    Json(state.monitor.snapshot().await)
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/sensor-data", post(post_sensor_data))
        .route("/history", get(get_history))
        .route("/live", get(get_live))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::{router, HttpState};
    use crate::persistence::PersistenceGateway;
    use crate::test_support::{test_monitor, MemoryGateway};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state(gateway: Arc<MemoryGateway>) -> HttpState {
        HttpState {
            monitor: test_monitor(),
            gateway: gateway as Arc<dyn PersistenceGateway>,
            history_limit: 20,
        }
    }

    async fn send(state: HttpState, request: Request<Body>) -> (StatusCode, Value) {
        let resp = router(state).oneshot(request).await.unwrap();
        let status = resp.status();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn post_reading(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/sensor-data")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn milk(temperature: f64) -> Value {
        json!({
            "unit_id": 1,
            "unit_name": "Milk Storage",
            "temperature": temperature,
            "humidity": 60.0,
            "timestamp": "2026-01-11 08:15:02"
        })
    }

    #[tokio::test]
    async fn pushed_reading_is_saved_and_visible_live() {
        let gateway = Arc::new(MemoryGateway::with_units(&[1, 2]));
        let state = state(gateway.clone());

        let (status, body) = send(state.clone(), post_reading(milk(7.5))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "saved"}));
        assert_eq!(gateway.rows().len(), 1);

        let (status, live) = send(state, get("/live")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(live["latest_data"]["1"]["temperature"], 7.5);
        assert_eq!(live["alerts"].as_array().map(Vec::len), Some(1));
        assert_eq!(
            live["alerts"][0]["message"],
            "Critical: Milk Storage High Temp (7.5°C)"
        );
    }

    #[tokio::test]
    async fn malformed_push_returns_error_body() {
        let gateway = Arc::new(MemoryGateway::with_units(&[1]));
        let state = state(gateway.clone());
        let (status, body) = send(
            state.clone(),
            post_reading(json!({"unit_id": 1, "humidity": 20.0})),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "missing required field `temperature`");
        assert!(gateway.rows().is_empty());

        let (_, live) = send(state, get("/live")).await;
        assert_eq!(live, json!({"latest_data": {}, "alerts": []}));
    }

    #[tokio::test]
    async fn storage_failure_is_reported_to_caller() {
        let gateway = Arc::new(MemoryGateway::with_units(&[1]));
        let state = state(gateway.clone());
        let mut unknown = milk(3.0);
        unknown["unit_id"] = json!(42);
        let (status, body) = send(state.clone(), post_reading(unknown)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "unit 42 is not registered in StorageUnits");

        let (_, health) = send(state, get("/healthz")).await;
        assert_eq!(health["status"], "ok");
        assert_eq!(health["persistence_failures"], 1);
        assert_eq!(health["readings_processed"], 1);
    }

    #[tokio::test]
    async fn history_is_capped_and_newest_first() {
        let gateway = Arc::new(MemoryGateway::with_units(&[1]));
        let state = state(gateway.clone());
        for n in 0..25 {
            let (status, _) = send(state.clone(), post_reading(milk(n as f64))).await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, history) = send(state, get("/history")).await;
        assert_eq!(status, StatusCode::OK);
        let entries = history.as_array().expect("array");
        assert_eq!(entries.len(), 20);
        assert_eq!(entries[0]["temperature"], 24.0);
        assert_eq!(entries[19]["temperature"], 5.0);
        assert_eq!(
            entries[0],
            json!({
                "unit_id": 1,
                "temperature": 24.0,
                "humidity": 60.0,
                "timestamp": "2026-01-11 08:15:02"
            })
        );
    }

    #[tokio::test]
    async fn history_stays_capped_when_state_asks_for_more() {
        let gateway = Arc::new(MemoryGateway::with_units(&[1]));
        let mut state = state(gateway.clone());
        state.history_limit = 100;
        for n in 0..30 {
            let (status, _) = send(state.clone(), post_reading(milk(n as f64))).await;
            assert_eq!(status, StatusCode::OK);
        }
        assert_eq!(gateway.rows().len(), 30);

        let (status, history) = send(state, get("/history")).await;
        assert_eq!(status, StatusCode::OK);
        let entries = history.as_array().expect("array");
        assert_eq!(entries.len(), 20);
        assert_eq!(entries[0]["temperature"], 29.0);
    }

    #[tokio::test]
    async fn history_failure_returns_empty_array() {
        let gateway = Arc::new(MemoryGateway::with_units(&[1]));
        gateway.set_offline(true);
        let (status, body) = send(state(gateway), get("/history")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!([]));
    }
}
