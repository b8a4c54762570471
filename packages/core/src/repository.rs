//! Backing-store access for stage intervals.
//!
//! [`IntervalSource`] is the delta query the cache updater depends on.
//! [`IntervalRepository`] implements it on SQLite: one row per stage
//! interval, the full interval stored as JSON next to the columns the
//! range and modification-time filters need.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microsecond
//! precision, `Z` suffix), so string comparison in SQL orders them in time.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Row, SqlitePool};
use thiserror::Error;

use crate::intervals::Interval;
use crate::workflow::WorkflowDefinitionId;

/// Errors from the interval backing store.
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to encode interval {name}: {source}")]
    Encode {
        name: String,
        source: serde_json::Error,
    },

    #[error("Backing store unavailable: {message}")]
    Unavailable { message: String },
}

/// Delta/range query over stored stage intervals.
#[async_trait]
pub trait IntervalSource {
    /// Every stage interval of `stage_ids` whose window intersects
    /// `[start, end]` and whose modification time is at or after
    /// `modified_since`, grouped by stage name.
    async fn find(
        &self,
        stage_ids: &[WorkflowDefinitionId],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        modified_since: DateTime<Utc>,
    ) -> Result<HashMap<String, Vec<Interval>>, RepositoryError>;

    /// Name of this source for logging.
    fn source_name(&self) -> &str;
}

pub(crate) fn to_db_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// SQLite-backed interval store.
pub struct IntervalRepository {
    pool: SqlitePool,
}

impl IntervalRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace stage intervals in a single transaction.
    pub async fn upsert_intervals(&self, intervals: &[Interval]) -> Result<(), RepositoryError> {
        if intervals.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for interval in intervals {
            let payload =
                serde_json::to_string(interval).map_err(|source| RepositoryError::Encode {
                    name: interval.name().to_string(),
                    source,
                })?;

            sqlx::query(
                "INSERT OR REPLACE INTO intervals
                 (name, start_time, end_time, modification_time, kind, payload)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(interval.name())
            .bind(to_db_time(interval.start_time()))
            .bind(to_db_time(interval.end_time))
            .bind(to_db_time(interval.modification_time))
            .bind(interval.kind.label())
            .bind(&payload)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl IntervalSource for IntervalRepository {
    async fn find(
        &self,
        stage_ids: &[WorkflowDefinitionId],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        modified_since: DateTime<Utc>,
    ) -> Result<HashMap<String, Vec<Interval>>, RepositoryError> {
        if stage_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = vec!["?"; stage_ids.len()].join(", ");
        let sql = format!(
            "SELECT name, payload
             FROM intervals
             WHERE name IN ({})
               AND end_time > ?
               AND start_time < ?
               AND modification_time >= ?
             ORDER BY start_time ASC",
            placeholders
        );

        let rows = {
            let mut q = sqlx::query(&sql);
            for id in stage_ids {
                q = q.bind(&id.name);
            }
            q.bind(to_db_time(start))
                .bind(to_db_time(end))
                .bind(to_db_time(modified_since))
                .fetch_all(&self.pool)
                .await?
        };

        let mut by_stage: HashMap<String, Vec<Interval>> = HashMap::new();
        for row in rows {
            let name: String = row.try_get("name")?;
            let payload: String = row.try_get("payload")?;

            match serde_json::from_str::<Interval>(&payload) {
                Ok(interval) => by_stage.entry(name).or_default().push(interval),
                Err(err) => {
                    tracing::warn!("Skipping malformed interval row for stage {}: {}", name, err);
                }
            }
        }

        Ok(by_stage)
    }

    fn source_name(&self) -> &str {
        "sqlite"
    }
}
