//! Retry with exponential backoff for backing-store queries.
//!
//! [`RetryingIntervalSource`] wraps any [`IntervalSource`] so a transient
//! database hiccup is retried inside the tick instead of waiting a whole
//! polling period. Once attempts are exhausted the last error goes back to
//! the updater, which skips the tick.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;

use crate::intervals::Interval;
use crate::repository::{IntervalSource, RepositoryError};
use crate::workflow::WorkflowDefinitionId;

/// Ratio between the longest and the first backoff delay.
const MAX_DELAY_FACTOR: u32 = 10;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Policy with `max_delay` fixed at ten times `initial_delay`.
    pub fn new(initial_delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay,
            max_delay: initial_delay.saturating_mul(MAX_DELAY_FACTOR),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Delay before retry number `attempt` (1-based), with up to 50% jitter
    /// added and capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let base = self
            .initial_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);

        let jitter_ceiling = base.as_millis() as u64 / 2;
        let jitter = if jitter_ceiling == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ceiling)
        };

        base.saturating_add(Duration::from_millis(jitter)).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), 3)
    }
}

/// [`IntervalSource`] decorator applying a [`RetryPolicy`].
pub struct RetryingIntervalSource {
    inner: Arc<dyn IntervalSource + Send + Sync>,
    policy: RetryPolicy,
}

impl RetryingIntervalSource {
    pub fn new(inner: Arc<dyn IntervalSource + Send + Sync>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl IntervalSource for RetryingIntervalSource {
    async fn find(
        &self,
        stage_ids: &[WorkflowDefinitionId],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        modified_since: DateTime<Utc>,
    ) -> Result<HashMap<String, Vec<Interval>>, RepositoryError> {
        let mut attempt = 1;
        loop {
            match self.inner.find(stage_ids, start, end, modified_since).await {
                Ok(found) => return Ok(found),
                Err(err) if attempt < self.policy.max_attempts => {
                    let delay = self.policy.backoff(attempt);
                    tracing::warn!(
                        "Interval query against {} failed (attempt {}/{}), retrying in {:?}: {}",
                        self.inner.source_name(),
                        attempt,
                        self.policy.max_attempts,
                        delay,
                        err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn source_name(&self) -> &str {
        self.inner.source_name()
    }
}
