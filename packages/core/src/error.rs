use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::intervals::TransitionError;
use crate::workflow::WorkflowError;

/// Unified application error.
///
/// Startup failures and request failures at the HTTP boundary both end up
/// here.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Config(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        AppError::InvalidInput(err.to_string())
    }
}

impl From<WorkflowError> for AppError {
    fn from(err: WorkflowError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use http_body_util::BodyExt;

    use crate::intervals::{IntervalId, IntervalStatus};
    use crate::workflow::WorkflowDefinitionId;

    #[test]
    fn transition_errors_are_bad_requests() {
        let err: AppError = TransitionError::UnsupportedStatus(IntervalStatus::Failed).into();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let id = IntervalId::from(
            Utc.timestamp_opt(0, 0).unwrap(),
            WorkflowDefinitionId::from("Auto 1"),
        );
        let err: AppError = TransitionError::NotInteractive(id).into();
        assert!(err.to_string().contains("Auto 1"));
    }

    #[test]
    fn status_codes_per_variant() {
        assert_eq!(
            AppError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Internal("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::Config("x".into()).to_string(),
            "Config error: x"
        );
    }

    #[tokio::test]
    async fn into_response_renders_json_error_body() {
        let response = AppError::InvalidInput("bad status".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"], "Invalid input: bad status");
    }
}
