//! Static workflow topology.
//!
//! A [`Workflow`] is loaded once at startup (see [`loader`]) and shared by
//! `Arc` with every component that needs it. Nothing mutates it afterwards.

pub mod loader;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use loader::{load_workflow, parse_workflow, WorkflowError};

/// Stable name identifying a stage, sequence or activity definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkflowDefinitionId {
    pub name: String,
}

impl WorkflowDefinitionId {
    pub fn from(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for WorkflowDefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// How a stage is driven: by the automated pipeline or by analysts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageMode {
    Automatic,
    Interactive,
}

/// One stage definition and the sequence/activity definitions it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    pub name: String,
    pub mode: StageMode,
    #[serde(default)]
    pub children: Vec<WorkflowDefinitionId>,
}

impl Stage {
    pub fn id(&self) -> WorkflowDefinitionId {
        WorkflowDefinitionId::from(self.name.clone())
    }
}

/// The configured workflow: a name and its stages, in pipeline order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub name: String,
    pub stages: Vec<Stage>,
}

impl Workflow {
    /// Ids of every stage, in pipeline order.
    pub fn stage_ids(&self) -> Vec<WorkflowDefinitionId> {
        self.stages.iter().map(Stage::id).collect()
    }
}
