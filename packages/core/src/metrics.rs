//! Prometheus metrics registry for the workflow manager.
//!
//! [`AppMetrics`] owns all registered metrics and the [`Registry`] they
//! belong to. Construct it once at startup, wrap in `Arc`, and pass it
//! to the scheduler and HTTP middleware.
//!
//! Exposed at `GET /metrics` in Prometheus text exposition format
//! (`text/plain; version=0.0.4`).

use prometheus::{Counter, CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry};

/// All application-level Prometheus metrics.
pub struct AppMetrics {
    /// Interval cache synchronisation runs (success + failure).
    pub sync_ticks_total: Counter,
    /// Synchronisation runs aborted by a backing-store failure.
    pub sync_errors_total: Counter,
    /// Stage intervals currently held in the cache.
    pub intervals_cached: Gauge,
    /// Intervals reported as new by synchronisation.
    pub delta_intervals_total: Counter,
    /// Change notifications successfully published.
    pub events_published_total: Counter,
    /// Change notifications that failed to publish.
    pub publish_errors_total: Counter,
    /// HTTP request count, labelled by method, path, and status code.
    pub http_requests_total: CounterVec,
    /// HTTP request latency histogram in seconds.
    pub http_request_duration: Histogram,
    /// The registry that owns all of the above metrics.
    pub registry: Registry,
}

impl AppMetrics {
    /// Create and register all metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let sync_ticks_total = Counter::with_opts(Opts::new(
            "workflow_manager_sync_ticks_total",
            "Interval cache synchronisation runs",
        ))?;

        let sync_errors_total = Counter::with_opts(Opts::new(
            "workflow_manager_sync_errors_total",
            "Synchronisation runs aborted by a backing-store failure",
        ))?;

        let intervals_cached = Gauge::with_opts(Opts::new(
            "workflow_manager_intervals_cached",
            "Stage intervals currently held in the cache",
        ))?;

        let delta_intervals_total = Counter::with_opts(Opts::new(
            "workflow_manager_delta_intervals_total",
            "Intervals reported as new by synchronisation",
        ))?;

        let events_published_total = Counter::with_opts(Opts::new(
            "workflow_manager_events_published_total",
            "Interval change notifications published",
        ))?;

        let publish_errors_total = Counter::with_opts(Opts::new(
            "workflow_manager_publish_errors_total",
            "Interval change notifications that failed to publish",
        ))?;

        let http_requests_total = CounterVec::new(
            Opts::new(
                "workflow_manager_http_requests_total",
                "HTTP requests by method, path, and status",
            ),
            &["method", "path", "status"],
        )?;

        let http_request_duration = Histogram::with_opts(
            HistogramOpts::new(
                "workflow_manager_http_request_duration_seconds",
                "HTTP request latency in seconds",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        )?;

        registry.register(Box::new(sync_ticks_total.clone()))?;
        registry.register(Box::new(sync_errors_total.clone()))?;
        registry.register(Box::new(intervals_cached.clone()))?;
        registry.register(Box::new(delta_intervals_total.clone()))?;
        registry.register(Box::new(events_published_total.clone()))?;
        registry.register(Box::new(publish_errors_total.clone()))?;
        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;

        Ok(Self {
            sync_ticks_total,
            sync_errors_total,
            intervals_cached,
            delta_intervals_total,
            events_published_total,
            publish_errors_total,
            http_requests_total,
            http_request_duration,
            registry,
        })
    }

    /// Render all metrics as Prometheus text format (for the `/metrics` endpoint).
    pub fn render(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&metric_families, &mut buf)?;
        Ok(String::from_utf8(buf).unwrap_or_default())
    }
}
