//! Core interval types.
//!
//! Every interval kind shares one field set ([`Interval`]); what differs
//! between stages, sequences and activities lives in [`IntervalKind`].

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflow::WorkflowDefinitionId;

/// Identity of an interval: the definition that produced it and its start.
///
/// A definition produces at most one interval per start time, so this pair
/// is the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalId {
    pub start_time: DateTime<Utc>,
    pub definition_id: WorkflowDefinitionId,
}

impl IntervalId {
    pub fn from(start_time: DateTime<Utc>, definition_id: WorkflowDefinitionId) -> Self {
        Self {
            start_time,
            definition_id,
        }
    }

    pub fn name(&self) -> &str {
        &self.definition_id.name
    }
}

impl fmt::Display for IntervalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.definition_id, self.start_time.to_rfc3339())
    }
}

/// Processing status of an interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntervalStatus {
    NotStarted,
    InProgress,
    NotComplete,
    Complete,
    Failed,
    Skipped,
}

impl IntervalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalStatus::NotStarted => "NOT_STARTED",
            IntervalStatus::InProgress => "IN_PROGRESS",
            IntervalStatus::NotComplete => "NOT_COMPLETE",
            IntervalStatus::Complete => "COMPLETE",
            IntervalStatus::Failed => "FAILED",
            IntervalStatus::Skipped => "SKIPPED",
        }
    }
}

impl fmt::Display for IntervalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A time-bounded status record for one stage, sequence or activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interval {
    pub interval_id: IntervalId,
    pub end_time: DateTime<Utc>,
    pub status: IntervalStatus,
    pub processing_start_time: Option<DateTime<Utc>>,
    pub processing_end_time: Option<DateTime<Utc>>,
    pub store_time: Option<DateTime<Utc>>,
    pub modification_time: DateTime<Utc>,
    pub percent_available: f64,
    pub comment: String,
    #[serde(flatten)]
    pub kind: IntervalKind,
}

/// Kind discriminant plus the kind-specific data.
///
/// Stage kinds own their (ordered, non-empty) child intervals; the cache
/// does not check that, upstream producers guarantee it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum IntervalKind {
    AutomaticProcessingStage {
        sequence_intervals: Vec<Interval>,
    },
    InteractiveAnalysisStage {
        activity_intervals: Vec<Interval>,
    },
    ProcessingSequence {
        stage_name: String,
        percent_complete: f64,
        last_executed_step_name: Option<String>,
    },
    Activity {
        stage_name: String,
        active_analysts: BTreeSet<String>,
    },
}

impl IntervalKind {
    pub fn label(&self) -> &'static str {
        match self {
            IntervalKind::AutomaticProcessingStage { .. } => "AutomaticProcessingStage",
            IntervalKind::InteractiveAnalysisStage { .. } => "InteractiveAnalysisStage",
            IntervalKind::ProcessingSequence { .. } => "ProcessingSequence",
            IntervalKind::Activity { .. } => "Activity",
        }
    }
}

impl Interval {
    /// Build an interval with no processing times, no comment and 0% availability.
    pub fn new(
        interval_id: IntervalId,
        end_time: DateTime<Utc>,
        status: IntervalStatus,
        modification_time: DateTime<Utc>,
        kind: IntervalKind,
    ) -> Self {
        Self {
            interval_id,
            end_time,
            status,
            processing_start_time: None,
            processing_end_time: None,
            store_time: None,
            modification_time,
            percent_available: 0.0,
            comment: String::new(),
            kind,
        }
    }

    /// Display name, derived from the definition id.
    pub fn name(&self) -> &str {
        self.interval_id.name()
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.interval_id.start_time
    }

    /// Name of the stage this interval belongs to. For stage intervals that
    /// is their own name.
    pub fn stage_name(&self) -> &str {
        match &self.kind {
            IntervalKind::ProcessingSequence { stage_name, .. }
            | IntervalKind::Activity { stage_name, .. } => stage_name,
            _ => self.name(),
        }
    }

    pub fn is_stage(&self) -> bool {
        matches!(
            self.kind,
            IntervalKind::AutomaticProcessingStage { .. }
                | IntervalKind::InteractiveAnalysisStage { .. }
        )
    }

    /// Child intervals of a stage; empty for sequences and activities.
    pub fn children(&self) -> &[Interval] {
        match &self.kind {
            IntervalKind::AutomaticProcessingStage { sequence_intervals } => sequence_intervals,
            IntervalKind::InteractiveAnalysisStage { activity_intervals } => activity_intervals,
            _ => &[],
        }
    }

    /// True when `[start, end]` overlaps this interval's own window.
    pub fn intersects(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time() < end && self.end_time > start
    }
}
