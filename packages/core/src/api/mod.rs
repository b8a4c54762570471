//! HTTP surface of the workflow manager.
//!
//! [`create_router`] assembles everything `main.rs` serves: the workflow
//! routes under `/workflow-manager`, health probes, and `/metrics`, with
//! permissive CORS and per-request Prometheus accounting.

pub mod health;
pub mod workflow;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{MatchedPath, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;

use crate::metrics::AppMetrics;
use health::HealthState;
use workflow::{create_workflow_router, WorkflowState};

pub const API_PREFIX: &str = "/workflow-manager";

/// Build the full application router.
pub fn create_router(state: WorkflowState, health: HealthState) -> Router {
    let metrics = state.metrics.clone();

    Router::new()
        .nest(API_PREFIX, create_workflow_router(state))
        .merge(health::create_health_router(health))
        .merge(
            Router::new()
                .route("/metrics", get(render_metrics))
                .with_state(metrics.clone()),
        )
        .layer(middleware::from_fn_with_state(metrics, track_requests))
        .layer(CorsLayer::permissive())
}

/// `GET /metrics`
async fn render_metrics(State(metrics): State<Arc<AppMetrics>>) -> Response {
    match metrics.render() {
        Ok(body) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
            .body(Body::from(body))
            .expect("metrics response should be valid"),
        Err(err) => {
            tracing::error!("Failed to render metrics: {}", err);
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::from("metrics error"))
                .expect("metrics error response should be valid")
        }
    }
}

/// Count and time every request, labelled by its route template.
async fn track_requests(
    State(metrics): State<Arc<AppMetrics>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    // Unmatched paths share one label to keep cardinality bounded.
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let started = Instant::now();
    let response = next.run(request).await;

    metrics
        .http_request_duration
        .observe(started.elapsed().as_secs_f64());
    metrics
        .http_requests_total
        .with_label_values(&[method.as_str(), path.as_str(), response.status().as_str()])
        .inc();

    response
}
