use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use crate::cache::IntervalCache;
use crate::scheduler::SyncStatus;

#[derive(Clone)]
pub struct HealthState {
    pub cache: Arc<IntervalCache>,
    pub sync: SyncStatus,
}

impl HealthState {
    pub fn new(cache: Arc<IntervalCache>, sync: SyncStatus) -> Self {
        Self { cache, sync }
    }
}

pub fn create_health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(ready))
        .with_state(state)
}

/// Liveness: the process is up and serving.
pub async fn health() -> impl IntoResponse {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CACHE_CONTROL, HeaderValue::from_static("no-store"))
        .body(Body::from("ok"))
        .expect("health response should be valid")
}

/// Readiness: 503 until one synchronisation has completed, even if the
/// store had nothing in the window.
pub async fn ready(State(state): State<HealthState>) -> impl IntoResponse {
    let synced = state.sync.is_synced();
    let status = if synced {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        [(header::CACHE_CONTROL, HeaderValue::from_static("no-store"))],
        Json(serde_json::json!({
            "synced": synced,
            "intervalsCached": state.cache.len(),
            "latestModificationTime": state.cache.latest_modification_time(),
        })),
    )
}
