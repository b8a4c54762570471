//! In-memory interval cache.
//!
//! `IntervalCache` holds every stage interval inside the operational window,
//! keyed by [`IntervalId`]. It is `Sync` on its own: entries live in a
//! sharded [`DashMap`], so reads and per-key updates only contend with
//! traffic hitting the same shard. Nothing in here performs I/O.
//!
//! Update closures run while the key's shard is write-locked. They must be
//! pure and must not call back into the cache.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::intervals::{Interval, IntervalId};

/// Concurrency-safe `IntervalId -> Interval` store.
#[derive(Debug, Default)]
pub struct IntervalCache {
    intervals: DashMap<IntervalId, Interval>,
    latest_modification_time: RwLock<Option<DateTime<Utc>>>,
}

impl IntervalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point lookup.
    pub fn get(&self, id: &IntervalId) -> Option<Interval> {
        self.intervals.get(id).map(|entry| entry.value().clone())
    }

    /// Every interval named in `stage_names` whose window intersects
    /// `[start, end]`. Unordered.
    pub fn get_all(
        &self,
        stage_names: &HashSet<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<Interval> {
        if stage_names.is_empty() {
            return Vec::new();
        }

        self.intervals
            .iter()
            .filter(|entry| {
                let interval = entry.value();
                stage_names.contains(interval.name()) && interval.intersects(start, end)
            })
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn contains_key(&self, id: &IntervalId) -> bool {
        self.intervals.contains_key(id)
    }

    /// Atomically replace the cached value for `id` with `f(current)`.
    ///
    /// Absent keys are left absent and yield `None`.
    pub fn update<F>(&self, id: &IntervalId, f: F) -> Option<Interval>
    where
        F: FnOnce(Interval) -> Interval,
    {
        let updated = {
            let mut entry = self.intervals.get_mut(id)?;
            let updated = f(entry.value().clone());
            *entry.value_mut() = updated.clone();
            updated
        };

        self.observe_modification_time(updated.modification_time);
        Some(updated)
    }

    /// Atomically apply `f` to the cached value for `id`, if there is one.
    ///
    /// When `f` returns `None` the entry is left as it was and `None` is
    /// returned; this is how callers reject illegal status transitions
    /// without racing concurrent writers.
    pub fn update_if_present<F>(&self, id: &IntervalId, f: F) -> Option<Interval>
    where
        F: FnOnce(Interval) -> Option<Interval>,
    {
        let updated = {
            let mut entry = self.intervals.get_mut(id)?;
            let updated = f(entry.value().clone())?;
            *entry.value_mut() = updated.clone();
            updated
        };

        self.observe_modification_time(updated.modification_time);
        Some(updated)
    }

    /// Insert or overwrite a single interval.
    pub fn put(&self, interval: Interval) {
        let modification_time = interval.modification_time;
        self.intervals.insert(interval.interval_id.clone(), interval);
        self.observe_modification_time(modification_time);
    }

    /// Unconditional bulk upsert.
    pub fn put_all<I>(&self, intervals: I)
    where
        I: IntoIterator<Item = Interval>,
    {
        for interval in intervals {
            self.put(interval);
        }
    }

    /// Drop every interval starting strictly before `cutoff`.
    /// Returns the number of entries removed.
    pub fn prune(&self, cutoff: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.intervals.retain(|id, _| {
            let keep = id.start_time >= cutoff;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Latest modification time ever inserted, pruned entries included.
    pub fn latest_modification_time(&self) -> Option<DateTime<Utc>> {
        *self.latest_modification_time.read()
    }

    /// Number of intervals currently held.
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// `true` when the cache holds no intervals.
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    fn observe_modification_time(&self, modification_time: DateTime<Utc>) {
        let mut latest = self.latest_modification_time.write();
        if latest.map_or(true, |current| modification_time > current) {
            *latest = Some(modification_time);
        }
    }
}
