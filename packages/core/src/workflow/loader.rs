//! Workflow topology loader.
//!
//! Reads the workflow definition from a JSON document once at startup.

use std::collections::HashSet;
use std::path::Path;

use thiserror::Error;

use super::Workflow;

/// Errors raised while loading the workflow definition.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Failed to read workflow definition {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse workflow definition: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid workflow definition: {message}")]
    Invalid { message: String },
}

impl WorkflowError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// Load and validate the workflow definition stored at `path`.
pub fn load_workflow(path: impl AsRef<Path>) -> Result<Workflow, WorkflowError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| WorkflowError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let workflow = parse_workflow(&raw)?;
    tracing::info!(
        "Loaded workflow '{}' with {} stages",
        workflow.name,
        workflow.stages.len()
    );
    Ok(workflow)
}

/// Parse a workflow definition from JSON and check its structure.
pub fn parse_workflow(raw: &str) -> Result<Workflow, WorkflowError> {
    let workflow: Workflow = serde_json::from_str(raw)?;

    if workflow.name.trim().is_empty() {
        return Err(WorkflowError::invalid("workflow name must not be empty"));
    }
    if workflow.stages.is_empty() {
        return Err(WorkflowError::invalid(format!(
            "workflow '{}' defines no stages",
            workflow.name
        )));
    }

    let mut seen = HashSet::new();
    for stage in &workflow.stages {
        if !seen.insert(stage.name.as_str()) {
            return Err(WorkflowError::invalid(format!(
                "duplicate stage name '{}'",
                stage.name
            )));
        }
    }

    Ok(workflow)
}
