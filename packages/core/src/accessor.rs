//! Workflow accessor.
//!
//! The façade the HTTP layer talks to. It pairs the static [`Workflow`]
//! with the live [`IntervalCache`] and never touches the backing store, so
//! reads stay available while the store is down.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::cache::IntervalCache;
use crate::intervals::{Interval, IntervalId};
use crate::workflow::{Workflow, WorkflowDefinitionId};

pub struct WorkflowAccessor {
    workflow: Arc<Workflow>,
    cache: Arc<IntervalCache>,
}

impl WorkflowAccessor {
    pub fn new(workflow: Arc<Workflow>, cache: Arc<IntervalCache>) -> Self {
        Self { workflow, cache }
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn find_stage_interval_by_id(&self, id: &IntervalId) -> Option<Interval> {
        self.cache.get(id)
    }

    pub fn update<F>(&self, id: &IntervalId, f: F) -> Option<Interval>
    where
        F: FnOnce(Interval) -> Interval,
    {
        self.cache.update(id, f)
    }

    pub fn update_if_present<F>(&self, id: &IntervalId, f: F) -> Option<Interval>
    where
        F: FnOnce(Interval) -> Option<Interval>,
    {
        self.cache.update_if_present(id, f)
    }

    /// Cached stage intervals in `[start, end]` for the requested stages,
    /// grouped by stage name.
    ///
    /// Stages without intervals in range, including names the cache has
    /// never seen, get no entry at all.
    pub fn find_stage_intervals_by_stage_id_and_time(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        stage_ids: &[WorkflowDefinitionId],
    ) -> HashMap<String, Vec<Interval>> {
        let stage_names: HashSet<String> = stage_ids.iter().map(|id| id.name.clone()).collect();

        let mut by_stage: HashMap<String, Vec<Interval>> = HashMap::new();
        for interval in self.cache.get_all(&stage_names, start, end) {
            by_stage
                .entry(interval.name().to_string())
                .or_default()
                .push(interval);
        }

        for intervals in by_stage.values_mut() {
            intervals.sort_by_key(Interval::start_time);
        }
        by_stage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    use crate::intervals::{IntervalKind, IntervalStatus};
    use crate::workflow::{Stage, StageMode};

    const STAGES: [&str; 4] = ["Auto 1", "Test 1", "Auto 2", "Test 2"];

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(0, 0).unwrap()
    }

    fn workflow() -> Arc<Workflow> {
        Arc::new(Workflow {
            name: "Test Workflow".to_string(),
            stages: STAGES
                .iter()
                .map(|name| Stage {
                    name: name.to_string(),
                    mode: if name.starts_with("Auto") {
                        StageMode::Automatic
                    } else {
                        StageMode::Interactive
                    },
                    children: vec![],
                })
                .collect(),
        })
    }

    fn make_stage(name: &str, start_offset_secs: i64) -> Interval {
        let start = t0() + Duration::seconds(start_offset_secs);
        let kind = if name.starts_with("Auto") {
            IntervalKind::AutomaticProcessingStage {
                sequence_intervals: vec![],
            }
        } else {
            IntervalKind::InteractiveAnalysisStage {
                activity_intervals: vec![],
            }
        };
        Interval::new(
            IntervalId::from(start, WorkflowDefinitionId::from(name)),
            start + Duration::seconds(300),
            IntervalStatus::NotStarted,
            t0(),
            kind,
        )
    }

    fn seeded_accessor() -> WorkflowAccessor {
        let cache = Arc::new(IntervalCache::new());
        cache.put_all(STAGES.iter().map(|name| make_stage(name, 0)));
        WorkflowAccessor::new(workflow(), cache)
    }

    #[test]
    fn groups_only_requested_stages() {
        let accessor = seeded_accessor();
        let result = accessor.find_stage_intervals_by_stage_id_and_time(
            t0(),
            t0() + Duration::seconds(300),
            &[
                WorkflowDefinitionId::from("Auto 1"),
                WorkflowDefinitionId::from("Test 2"),
            ],
        );

        let mut keys: Vec<_> = result.keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["Auto 1".to_string(), "Test 2".to_string()]);
        assert_eq!(result["Auto 1"], vec![make_stage("Auto 1", 0)]);
        assert_eq!(result["Test 2"], vec![make_stage("Test 2", 0)]);
    }

    #[test]
    fn stages_without_intervals_in_range_are_absent() {
        let accessor = seeded_accessor();
        let result = accessor.find_stage_intervals_by_stage_id_and_time(
            t0() + Duration::seconds(1_000),
            t0() + Duration::seconds(2_000),
            &[WorkflowDefinitionId::from("Auto 1")],
        );
        assert!(result.is_empty());
    }

    #[test]
    fn unknown_stage_ids_are_ignored() {
        let accessor = seeded_accessor();
        let result = accessor.find_stage_intervals_by_stage_id_and_time(
            t0(),
            t0() + Duration::seconds(300),
            &[
                WorkflowDefinitionId::from("Bogus"),
                WorkflowDefinitionId::from("Auto 2"),
            ],
        );
        assert_eq!(result.len(), 1);
        assert!(result.contains_key("Auto 2"));
    }

    #[test]
    fn intervals_within_a_stage_are_ordered_by_start() {
        let cache = Arc::new(IntervalCache::new());
        cache.put_all(vec![
            make_stage("Auto 1", 600),
            make_stage("Auto 1", 0),
            make_stage("Auto 1", 300),
        ]);
        let accessor = WorkflowAccessor::new(workflow(), cache);

        let result = accessor.find_stage_intervals_by_stage_id_and_time(
            t0(),
            t0() + Duration::seconds(900),
            &[WorkflowDefinitionId::from("Auto 1")],
        );
        let starts: Vec<_> = result["Auto 1"].iter().map(Interval::start_time).collect();
        assert_eq!(
            starts,
            vec![
                t0(),
                t0() + Duration::seconds(300),
                t0() + Duration::seconds(600)
            ]
        );
    }

    #[test]
    fn point_lookup_and_updates_pass_through_to_cache() {
        let accessor = seeded_accessor();
        let id = make_stage("Test 1", 0).interval_id;

        assert!(accessor.find_stage_interval_by_id(&id).is_some());
        assert!(accessor.update_if_present(&id, |_| None).is_none());

        let updated = accessor.update(&id, |mut current| {
            current.status = IntervalStatus::InProgress;
            current
        });
        assert_eq!(updated.map(|i| i.status), Some(IntervalStatus::InProgress));
        assert_eq!(
            accessor.find_stage_interval_by_id(&id).map(|i| i.status),
            Some(IntervalStatus::InProgress)
        );
    }

    #[test]
    fn workflow_is_shared_unchanged() {
        let accessor = seeded_accessor();
        assert_eq!(accessor.workflow().stages.len(), 4);
        assert_eq!(accessor.workflow().name, "Test Workflow");
    }
}
