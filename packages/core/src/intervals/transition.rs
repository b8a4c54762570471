//! Status transitions for interactive analysis stage intervals.
//!
//! These are pure functions intended to run inside
//! [`IntervalCache::update_if_present`](crate::cache::IntervalCache::update_if_present):
//! `Ok(Some(stage))` is the replacement value, `Ok(None)` means the request
//! changes nothing (or is not a legal transition from the current state) and
//! the cache must stay untouched. `Err` is reserved for requests that can
//! never apply to the target interval.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::types::{Interval, IntervalId, IntervalKind, IntervalStatus};

/// Requests that cannot apply to the addressed interval at all.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransitionError {
    #[error("Interval {0} is not an interactive analysis stage interval")]
    NotInteractive(IntervalId),

    #[error("Stage interval {stage} has no activity interval {activity}")]
    UnknownActivity {
        stage: IntervalId,
        activity: IntervalId,
    },

    #[error("Cannot move an interval to status {0}")]
    UnsupportedStatus(IntervalStatus),
}

/// Apply an analyst-issued status change to a whole interactive stage.
///
/// - `IN_PROGRESS` opens the stage (from `NOT_STARTED` or `NOT_COMPLETE`).
/// - `NOT_COMPLETE` closes it for `analyst`, releasing their activities.
/// - `COMPLETE` completes the stage and every activity in it.
pub fn apply_stage_status(
    stage: &Interval,
    status: IntervalStatus,
    analyst: &str,
    now: DateTime<Utc>,
) -> Result<Option<Interval>, TransitionError> {
    let activities = activity_intervals(stage)?;
    let mut updated_activities = activities.to_vec();

    let stage_status = match status {
        IntervalStatus::InProgress => match stage.status {
            IntervalStatus::NotStarted | IntervalStatus::NotComplete => IntervalStatus::InProgress,
            _ => return Ok(None),
        },
        IntervalStatus::NotComplete => {
            if stage.status != IntervalStatus::InProgress {
                return Ok(None);
            }
            for activity in &mut updated_activities {
                release_analyst(activity, analyst);
            }
            IntervalStatus::NotComplete
        }
        IntervalStatus::Complete => match stage.status {
            IntervalStatus::InProgress | IntervalStatus::NotComplete => {
                for activity in &mut updated_activities {
                    activity.status = IntervalStatus::Complete;
                    clear_analysts(activity);
                }
                IntervalStatus::Complete
            }
            _ => return Ok(None),
        },
        other => return Err(TransitionError::UnsupportedStatus(other)),
    };

    Ok(stamp_changes(stage, stage_status, updated_activities, now))
}

/// Apply an analyst-issued status change to one activity of a stage.
///
/// The stage status is re-derived from its activities afterwards.
pub fn apply_activity_status(
    stage: &Interval,
    activity_id: &IntervalId,
    status: IntervalStatus,
    analyst: &str,
    now: DateTime<Utc>,
) -> Result<Option<Interval>, TransitionError> {
    let activities = activity_intervals(stage)?;
    let index = activities
        .iter()
        .position(|activity| &activity.interval_id == activity_id)
        .ok_or_else(|| TransitionError::UnknownActivity {
            stage: stage.interval_id.clone(),
            activity: activity_id.clone(),
        })?;

    let mut updated_activities = activities.to_vec();
    let activity = &mut updated_activities[index];

    match status {
        IntervalStatus::InProgress => match activity.status {
            IntervalStatus::Failed | IntervalStatus::Skipped => return Ok(None),
            _ => {
                activity.status = IntervalStatus::InProgress;
                if let IntervalKind::Activity {
                    active_analysts, ..
                } = &mut activity.kind
                {
                    active_analysts.insert(analyst.to_string());
                }
            }
        },
        IntervalStatus::NotComplete => {
            if !release_analyst(activity, analyst) {
                return Ok(None);
            }
        }
        IntervalStatus::Complete => {
            if activity.status != IntervalStatus::InProgress {
                return Ok(None);
            }
            activity.status = IntervalStatus::Complete;
            clear_analysts(activity);
        }
        other => return Err(TransitionError::UnsupportedStatus(other)),
    }

    let stage_status = derive_stage_status(&updated_activities);
    Ok(stamp_changes(stage, stage_status, updated_activities, now))
}

/// Stage status implied by the statuses of its activities.
pub fn derive_stage_status(activities: &[Interval]) -> IntervalStatus {
    if !activities.is_empty()
        && activities
            .iter()
            .all(|activity| activity.status == IntervalStatus::Complete)
    {
        IntervalStatus::Complete
    } else if activities
        .iter()
        .any(|activity| activity.status == IntervalStatus::InProgress)
    {
        IntervalStatus::InProgress
    } else if activities
        .iter()
        .any(|activity| activity.status != IntervalStatus::NotStarted)
    {
        IntervalStatus::NotComplete
    } else {
        IntervalStatus::NotStarted
    }
}

fn activity_intervals(stage: &Interval) -> Result<&[Interval], TransitionError> {
    match &stage.kind {
        IntervalKind::InteractiveAnalysisStage { activity_intervals } => Ok(activity_intervals),
        _ => Err(TransitionError::NotInteractive(stage.interval_id.clone())),
    }
}

/// Remove `analyst` from an in-progress activity. Returns false when they
/// were not working on it.
fn release_analyst(activity: &mut Interval, analyst: &str) -> bool {
    let IntervalKind::Activity {
        active_analysts, ..
    } = &mut activity.kind
    else {
        return false;
    };

    if !active_analysts.remove(analyst) {
        return false;
    }
    if active_analysts.is_empty() && activity.status == IntervalStatus::InProgress {
        activity.status = IntervalStatus::NotComplete;
    }
    true
}

fn clear_analysts(activity: &mut Interval) {
    if let IntervalKind::Activity {
        active_analysts, ..
    } = &mut activity.kind
    {
        active_analysts.clear();
    }
}

/// Build the replacement stage, stamping `now` on every activity that
/// changed and on the stage itself. `None` when nothing changed.
fn stamp_changes(
    original: &Interval,
    stage_status: IntervalStatus,
    mut updated_activities: Vec<Interval>,
    now: DateTime<Utc>,
) -> Option<Interval> {
    let mut activities_changed = false;
    for (before, after) in activity_intervals(original)
        .unwrap_or(&[])
        .iter()
        .zip(updated_activities.iter_mut())
    {
        if before != after {
            activities_changed = true;
            after.modification_time = now;
        }
    }

    if !activities_changed && stage_status == original.status {
        return None;
    }

    let mut updated = original.clone();
    updated.status = stage_status;
    updated.modification_time = now;
    updated.kind = IntervalKind::InteractiveAnalysisStage {
        activity_intervals: updated_activities,
    };
    Some(updated)
}
