//! Incremental interval cache synchronisation.
//!
//! The updater keeps a modification-time high-water mark. Each call to
//! [`IntervalCacheUpdater::update_interval_cache`] asks the backing store
//! only for intervals modified at or after that mark, adds the ones the
//! cache has not seen yet, prunes entries that slid out of the operational
//! window, then moves the mark forward to the end of the period. The mark
//! never moves backwards, even for a period that ends before it.
//!
//! The floor is inclusive on purpose: the boundary record of the previous
//! run comes back again and is dropped by the `contains_key` check, so a
//! record is never reported as new twice.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::cache::IntervalCache;
use crate::intervals::{Interval, IntervalId};
use crate::repository::{IntervalSource, RepositoryError};
use crate::workflow::Workflow;

/// Time range a synchronisation run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationalPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl OperationalPeriod {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// `[now - start_offset, now - end_offset]`.
    pub fn anchored(now: DateTime<Utc>, start_offset: Duration, end_offset: Duration) -> Self {
        Self {
            start: now - start_offset,
            end: now - end_offset,
        }
    }
}

pub struct IntervalCacheUpdater {
    workflow: Arc<Workflow>,
    cache: Arc<IntervalCache>,
    source: Arc<dyn IntervalSource + Send + Sync>,
    floor: DateTime<Utc>,
    latest_mod_time: DateTime<Utc>,
}

impl IntervalCacheUpdater {
    /// `floor` is the high-water mark used when the cache has never seen a
    /// modification time.
    pub fn new(
        workflow: Arc<Workflow>,
        cache: Arc<IntervalCache>,
        source: Arc<dyn IntervalSource + Send + Sync>,
        floor: DateTime<Utc>,
    ) -> Self {
        Self {
            workflow,
            cache,
            source,
            floor,
            latest_mod_time: floor,
        }
    }

    /// Resume from the cache's own high-water mark, or the floor.
    /// Call before the first reconciliation.
    pub fn sync_latest_mod_time(&mut self) {
        self.latest_mod_time = self.cache.latest_modification_time().unwrap_or(self.floor);
        tracing::debug!("Interval cache high-water mark set to {}", self.latest_mod_time);
    }

    pub fn latest_mod_time(&self) -> DateTime<Utc> {
        self.latest_mod_time
    }

    /// Reconcile the cache against the backing store over `period` and
    /// return the intervals that were new to the cache.
    ///
    /// A failed query leaves both the cache and the high-water mark
    /// untouched.
    pub async fn update_interval_cache(
        &mut self,
        period: &OperationalPeriod,
    ) -> Result<Vec<Interval>, RepositoryError> {
        let stage_ids = self.workflow.stage_ids();
        let fetched = self
            .source
            .find(&stage_ids, period.start, period.end, self.latest_mod_time)
            .await?;

        let delta = self.new_intervals(fetched);

        let pruned = self.cache.prune(period.start);
        if pruned > 0 {
            tracing::debug!("Pruned {} intervals starting before {}", pruned, period.start);
        }

        self.cache.put_all(delta.iter().cloned());
        self.latest_mod_time = self.latest_mod_time.max(period.end);

        Ok(delta)
    }

    /// Drop intervals the cache already holds, collapsing duplicates within
    /// the batch to the most recently modified copy.
    fn new_intervals(&self, fetched: HashMap<String, Vec<Interval>>) -> Vec<Interval> {
        let mut unseen: HashMap<IntervalId, Interval> = HashMap::new();

        for interval in fetched.into_values().flatten() {
            if self.cache.contains_key(&interval.interval_id) {
                continue;
            }
            match unseen.get(&interval.interval_id) {
                Some(existing) if existing.modification_time >= interval.modification_time => {}
                _ => {
                    unseen.insert(interval.interval_id.clone(), interval);
                }
            }
        }

        let mut delta: Vec<Interval> = unseen.into_values().collect();
        delta.sort_by(|a, b| a.interval_id.cmp(&b.interval_id));
        delta
    }
}
