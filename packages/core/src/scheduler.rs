//! Interval cache synchronisation scheduler.
//!
//! Drives the updater on a fixed period: each tick anchors the operational
//! window to the current time, reconciles the cache against the backing
//! store, and publishes one event carrying every interval that was new.
//!
//! Ticks run sequentially on a single task. A tick that overruns the period
//! delays the next one instead of overlapping it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::cache::IntervalCache;
use crate::metrics::AppMetrics;
use crate::publisher::{SystemEvent, SystemEventPublisher};
use crate::updater::{IntervalCacheUpdater, OperationalPeriod};

/// Scheduler timing and notification settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub operational_start_offset: chrono::Duration,
    pub operational_end_offset: chrono::Duration,
    pub polling_period: Duration,
    pub event_type: String,
}

/// Shared flag raised by the first synchronisation that completes
/// without a source error, whether or not it found anything.
#[derive(Debug, Clone, Default)]
pub struct SyncStatus(Arc<AtomicBool>);

impl SyncStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_synced(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn mark_synced(&self) {
        self.0.store(true, Ordering::Release);
    }
}

pub struct IntervalCacheScheduler {
    updater: IntervalCacheUpdater,
    cache: Arc<IntervalCache>,
    publisher: Arc<dyn SystemEventPublisher + Send + Sync>,
    metrics: Arc<AppMetrics>,
    config: SchedulerConfig,
    status: SyncStatus,
}

impl IntervalCacheScheduler {
    pub fn new(
        updater: IntervalCacheUpdater,
        cache: Arc<IntervalCache>,
        publisher: Arc<dyn SystemEventPublisher + Send + Sync>,
        metrics: Arc<AppMetrics>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            updater,
            cache,
            publisher,
            metrics,
            config,
            status: SyncStatus::new(),
        }
    }

    /// Handle to the readiness flag, for the health routes.
    pub fn status(&self) -> SyncStatus {
        self.status.clone()
    }

    /// Run the synchronisation loop until `shutdown` is cancelled.
    ///
    /// The first tick fires immediately so the cache is seeded at startup.
    pub async fn run(mut self, shutdown: CancellationToken) {
        self.updater.sync_latest_mod_time();

        let mut interval = time::interval(self.config.polling_period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            "Interval cache synchronisation started (period: {:?}, window: -{}s..-{}s)",
            self.config.polling_period,
            self.config.operational_start_offset.num_seconds(),
            self.config.operational_end_offset.num_seconds()
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick(Utc::now()).await;
                }

                _ = shutdown.cancelled() => {
                    tracing::info!("Shutdown requested. Stopping interval synchronisation.");
                    break;
                }
            }
        }

        tracing::info!("Interval synchronisation stopped cleanly");
    }

    /// Execute a single synchronisation cycle anchored at `now`.
    /// Returns the number of new intervals. Extracted for testability.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> usize {
        let period = OperationalPeriod::anchored(
            now,
            self.config.operational_start_offset,
            self.config.operational_end_offset,
        );
        self.metrics.sync_ticks_total.inc();

        // 1. Reconcile cache against the backing store
        let delta = match self.updater.update_interval_cache(&period).await {
            Ok(delta) => delta,
            Err(err) => {
                self.metrics.sync_errors_total.inc();
                tracing::error!(
                    "Interval synchronisation failed, keeping high-water mark {}: {}",
                    self.updater.latest_mod_time(),
                    err
                );
                return 0;
            }
        };

        self.status.mark_synced();
        self.metrics.intervals_cached.set(self.cache.len() as f64);

        if delta.is_empty() {
            tracing::debug!("No new intervals between {} and {}", period.start, period.end);
            return 0;
        }

        // 2. Publish the whole delta as one event
        let count = delta.len();
        self.metrics.delta_intervals_total.inc_by(count as f64);
        tracing::info!("Interval cache updated with {} new intervals", count);

        let event = SystemEvent::intervals(self.config.event_type.clone(), delta);
        match self.publisher.publish(event).await {
            Ok(()) => self.metrics.events_published_total.inc(),
            Err(err) => {
                self.metrics.publish_errors_total.inc();
                tracing::error!(
                    "Failed to publish {} interval changes via {}: {}",
                    count,
                    self.publisher.publisher_name(),
                    err
                );
            }
        }

        count
    }

    pub fn updater(&self) -> &IntervalCacheUpdater {
        &self.updater
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;

    use crate::intervals::Interval;
    use crate::publisher::PublishError;
    use crate::updater::tests::{epoch, make_stage, test_workflow, MockIntervalSource, STAGES};

    /// Publisher that records every event it is handed.
    #[derive(Default)]
    pub(crate) struct RecordingPublisher {
        pub(crate) events: StdMutex<Vec<SystemEvent>>,
        pub(crate) fail: bool,
    }

    #[async_trait]
    impl SystemEventPublisher for RecordingPublisher {
        async fn publish(&self, event: SystemEvent) -> Result<(), PublishError> {
            self.events
                .lock()
                .expect("recording publisher lock poisoned")
                .push(event);
            if self.fail {
                Err(PublishError::Rejected { status: 500 })
            } else {
                Ok(())
            }
        }

        fn publisher_name(&self) -> &str {
            "recording"
        }
    }

    fn config() -> SchedulerConfig {
        // now = epoch + 300s gives the period [epoch, epoch + 300s]
        SchedulerConfig {
            operational_start_offset: ChronoDuration::seconds(300),
            operational_end_offset: ChronoDuration::zero(),
            polling_period: Duration::from_millis(50),
            event_type: "intervals".to_string(),
        }
    }

    fn now() -> DateTime<Utc> {
        epoch() + ChronoDuration::seconds(300)
    }

    struct Harness {
        scheduler: IntervalCacheScheduler,
        cache: Arc<IntervalCache>,
        source: Arc<MockIntervalSource>,
        publisher: Arc<RecordingPublisher>,
        metrics: Arc<AppMetrics>,
    }

    fn harness(publisher: RecordingPublisher) -> Harness {
        let stored: Vec<Interval> = STAGES
            .iter()
            .map(|name| make_stage(name, epoch(), epoch()))
            .collect();
        let cache = Arc::new(IntervalCache::new());
        cache.put(stored[1].clone());

        let source = Arc::new(MockIntervalSource::new(stored));
        let publisher = Arc::new(publisher);
        let metrics = Arc::new(AppMetrics::new().unwrap());

        let mut updater =
            IntervalCacheUpdater::new(test_workflow(), cache.clone(), source.clone(), epoch());
        updater.sync_latest_mod_time();

        let scheduler = IntervalCacheScheduler::new(
            updater,
            cache.clone(),
            publisher.clone(),
            metrics.clone(),
            config(),
        );

        Harness {
            scheduler,
            cache,
            source,
            publisher,
            metrics,
        }
    }

    #[tokio::test]
    async fn tick_publishes_one_event_with_full_delta() {
        let mut h = harness(RecordingPublisher::default());
        let test_1 = h
            .cache
            .get(&make_stage("Test 1", epoch(), epoch()).interval_id)
            .unwrap();

        let count = h.scheduler.tick(now()).await;

        assert_eq!(count, 3);
        let events = h.publisher.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "intervals");
        assert_eq!(events[0].sequence, 0);
        let mut names: Vec<_> = events[0].payload.iter().map(|i| i.name().to_string()).collect();
        names.sort();
        assert_eq!(names, vec!["Auto 1", "Auto 2", "Test 2"]);

        assert_eq!(h.cache.get(&test_1.interval_id), Some(test_1));
        assert_eq!(
            h.scheduler.updater().latest_mod_time(),
            epoch() + ChronoDuration::seconds(300)
        );
        assert!((h.metrics.intervals_cached.get() - 4.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn tick_with_empty_delta_publishes_nothing() {
        let mut h = harness(RecordingPublisher::default());
        h.scheduler.tick(now()).await;
        let count = h.scheduler.tick(now()).await;

        assert_eq!(count, 0);
        assert_eq!(h.publisher.events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_store_sync_still_marks_synced() {
        let cache = Arc::new(IntervalCache::new());
        let source = Arc::new(MockIntervalSource::new(vec![]));
        let publisher = Arc::new(RecordingPublisher::default());
        let mut scheduler = IntervalCacheScheduler::new(
            IntervalCacheUpdater::new(test_workflow(), cache.clone(), source, epoch()),
            cache.clone(),
            publisher.clone(),
            Arc::new(AppMetrics::new().unwrap()),
            config(),
        );
        let status = scheduler.status();
        assert!(!status.is_synced());

        assert_eq!(scheduler.tick(now()).await, 0);

        assert!(status.is_synced());
        assert!(cache.is_empty());
        assert!(publisher.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn tick_on_source_error_keeps_cache_and_mark() {
        let mut h = harness(RecordingPublisher::default());
        h.source.set_failing(true);

        let count = h.scheduler.tick(now()).await;

        assert_eq!(count, 0);
        assert_eq!(h.cache.len(), 1);
        assert!(!h.scheduler.status().is_synced());
        assert_eq!(h.scheduler.updater().latest_mod_time(), epoch());
        assert!(h.publisher.events.lock().unwrap().is_empty());
        assert!((h.metrics.sync_errors_total.get() - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn publish_failure_is_counted_not_fatal() {
        let mut h = harness(RecordingPublisher {
            fail: true,
            ..Default::default()
        });

        let count = h.scheduler.tick(now()).await;

        assert_eq!(count, 3);
        assert_eq!(h.cache.len(), 4);
        assert!((h.metrics.publish_errors_total.get() - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn run_seeds_cache_and_stops_on_cancel() {
        let h = harness(RecordingPublisher::default());
        let mut config = config();
        // a window that covers the epoch-based fixtures from the real clock
        config.operational_start_offset = ChronoDuration::seconds(Utc::now().timestamp() + 60);
        let scheduler = IntervalCacheScheduler::new(
            IntervalCacheUpdater::new(test_workflow(), h.cache.clone(), h.source.clone(), epoch()),
            h.cache.clone(),
            h.publisher.clone(),
            h.metrics.clone(),
            config,
        );

        let status = scheduler.status();

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(scheduler.run(shutdown.clone()));

        // paused clock: the runtime auto-advances through three polling periods
        tokio::time::sleep(Duration::from_millis(120)).await;
        shutdown.cancel();
        task.await.unwrap();

        assert!(status.is_synced());
        assert_eq!(h.cache.len(), 4);
        assert_eq!(h.publisher.events.lock().unwrap().len(), 1);
    }
}
