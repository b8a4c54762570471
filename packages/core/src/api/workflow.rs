//! Workflow and stage interval endpoints.
//!
//! Routes (nested under `/workflow-manager`):
//! - `POST /workflow-definition`: the configured workflow
//! - `POST /interval/stage/query/ids-timerange`: stage intervals by stage and time
//! - `POST /interval/stage/query/id`: one stage interval
//! - `POST /interval/stage/interactive-analysis/update`: analyst stage status change
//! - `POST /interval/activity/update`: analyst activity status change
//!
//! Reads are served from the interval cache only. Status changes are applied
//! atomically in the cache and announced with one [`SystemEvent`].

use std::collections::HashMap;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::accessor::WorkflowAccessor;
use crate::error::AppError;
use crate::intervals::{
    apply_activity_status, apply_stage_status, Interval, IntervalId, IntervalStatus,
    TransitionError,
};
use crate::metrics::AppMetrics;
use crate::publisher::{SystemEvent, SystemEventPublisher};
use crate::workflow::{Workflow, WorkflowDefinitionId};

/// Shared state for the workflow routes.
pub type WorkflowState = Arc<WorkflowApiState>;

pub struct WorkflowApiState {
    pub accessor: Arc<WorkflowAccessor>,
    pub publisher: Arc<dyn SystemEventPublisher + Send + Sync>,
    pub metrics: Arc<AppMetrics>,
    pub event_type: String,
}

/// Create the workflow API router (paths relative to `/workflow-manager`).
pub fn create_workflow_router(state: WorkflowState) -> Router {
    Router::new()
        .route("/workflow-definition", post(workflow_definition))
        .route(
            "/interval/stage/query/ids-timerange",
            post(find_stage_intervals_by_ids_and_time),
        )
        .route("/interval/stage/query/id", post(find_stage_interval_by_id))
        .route(
            "/interval/stage/interactive-analysis/update",
            post(update_interactive_analysis_stage),
        )
        .route("/interval/activity/update", post(update_activity))
        .with_state(state)
}

// ---- Request shapes ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageIntervalsQuery {
    pub stage_ids: Vec<WorkflowDefinitionId>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageStatusUpdate {
    pub stage_interval_id: IntervalId,
    pub status: IntervalStatus,
    pub user_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityStatusUpdate {
    pub stage_interval_id: IntervalId,
    pub activity_interval_id: IntervalId,
    pub status: IntervalStatus,
    pub user_name: String,
}

// ---- Handlers ----

/// `POST /workflow-definition`
pub async fn workflow_definition(State(state): State<WorkflowState>) -> Json<Workflow> {
    Json(state.accessor.workflow().clone())
}

/// `POST /interval/stage/query/ids-timerange`
pub async fn find_stage_intervals_by_ids_and_time(
    State(state): State<WorkflowState>,
    Json(query): Json<StageIntervalsQuery>,
) -> Result<Json<HashMap<String, Vec<Interval>>>, AppError> {
    if query.start_time > query.end_time {
        return Err(AppError::InvalidInput(format!(
            "startTime {} is after endTime {}",
            query.start_time, query.end_time
        )));
    }

    let found = state.accessor.find_stage_intervals_by_stage_id_and_time(
        query.start_time,
        query.end_time,
        &query.stage_ids,
    );
    Ok(Json(found))
}

/// `POST /interval/stage/query/id`
pub async fn find_stage_interval_by_id(
    State(state): State<WorkflowState>,
    Json(id): Json<IntervalId>,
) -> Result<Json<Interval>, AppError> {
    state
        .accessor
        .find_stage_interval_by_id(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No stage interval {}", id)))
}

/// `POST /interval/stage/interactive-analysis/update`
pub async fn update_interactive_analysis_stage(
    State(state): State<WorkflowState>,
    Json(request): Json<StageStatusUpdate>,
) -> Result<StatusCode, AppError> {
    require_user(&request.user_name)?;
    let now = Utc::now();

    let updated = apply_in_cache(&state, &request.stage_interval_id, |stage| {
        apply_stage_status(stage, request.status, &request.user_name, now)
    })?;

    if let Some(stage) = updated {
        tracing::debug!(
            "{} moved stage {} to {}",
            request.user_name,
            stage.interval_id,
            stage.status
        );
        publish_update(&state, stage).await;
    }
    Ok(StatusCode::OK)
}

/// `POST /interval/activity/update`
pub async fn update_activity(
    State(state): State<WorkflowState>,
    Json(request): Json<ActivityStatusUpdate>,
) -> Result<StatusCode, AppError> {
    require_user(&request.user_name)?;
    let now = Utc::now();

    let updated = apply_in_cache(&state, &request.stage_interval_id, |stage| {
        apply_activity_status(
            stage,
            &request.activity_interval_id,
            request.status,
            &request.user_name,
            now,
        )
    })?;

    if let Some(stage) = updated {
        tracing::debug!(
            "{} moved activity {} to {}",
            request.user_name,
            request.activity_interval_id,
            request.status
        );
        publish_update(&state, stage).await;
    }
    Ok(StatusCode::OK)
}

// ---- Helpers ----

fn require_user(user_name: &str) -> Result<(), AppError> {
    if user_name.trim().is_empty() {
        return Err(AppError::InvalidInput("userName must not be empty".to_string()));
    }
    Ok(())
}

/// Run `transition` atomically against the cached stage interval.
///
/// `Ok(None)` covers both a missing interval and a request that changes
/// nothing. A transition error leaves the cache untouched.
fn apply_in_cache<F>(
    state: &WorkflowApiState,
    id: &IntervalId,
    transition: F,
) -> Result<Option<Interval>, AppError>
where
    F: FnOnce(&Interval) -> Result<Option<Interval>, TransitionError>,
{
    let mut failure = None;
    let updated = state.accessor.update_if_present(id, |current| {
        match transition(&current) {
            Ok(next) => next,
            Err(err) => {
                failure = Some(err);
                None
            }
        }
    });

    match failure {
        Some(err) => Err(err.into()),
        None => Ok(updated),
    }
}

async fn publish_update(state: &WorkflowApiState, interval: Interval) {
    let id = interval.interval_id.clone();
    let event = SystemEvent::intervals(state.event_type.clone(), vec![interval]);

    match state.publisher.publish(event).await {
        Ok(()) => state.metrics.events_published_total.inc(),
        Err(err) => {
            state.metrics.publish_errors_total.inc();
            tracing::error!(
                "Failed to publish update of {} via {}: {}",
                id,
                state.publisher.publisher_name(),
                err
            );
        }
    }
}
