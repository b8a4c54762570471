use std::env;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cli::Cli;
use crate::retry::RetryPolicy;
use crate::scheduler::SchedulerConfig;

pub const DEFAULT_OPERATIONAL_PERIOD_START_SECONDS: i64 = 86_400;
pub const DEFAULT_OPERATIONAL_PERIOD_END_SECONDS: i64 = 0;
pub const DEFAULT_POLLING_PERIOD_SECONDS: u64 = 30;
pub const DEFAULT_INTERVAL_EVENT_TYPE: &str = "intervals";
pub const DEFAULT_API_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_RETRY_INITIAL_DELAY_MS: u64 = 500;
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_EVENT_BUS_TIMEOUT_MS: u64 = 5_000;

/// Largest accepted operational offset in either direction (100 years).
pub const MAX_OPERATIONAL_OFFSET_SECONDS: i64 = 100 * 365 * 86_400;
pub const MAX_POLLING_PERIOD_SECONDS: u64 = 86_400;
pub const MAX_RETRY_INITIAL_DELAY_MS: u64 = 3_600_000;
pub const MAX_EVENT_BUS_TIMEOUT_MS: u64 = 300_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub workflow_definition_path: String,
    /// Seconds before now at which the operational period starts.
    pub operational_period_start_seconds: i64,
    /// Seconds before now at which the operational period ends.
    pub operational_period_end_seconds: i64,
    pub polling_period_seconds: u64,
    pub interval_event_type: String,
    /// Webhook endpoint for change notifications. In-process broadcast when unset.
    pub event_bus_url: Option<String>,
    pub event_bus_timeout_ms: u64,
    pub api_bind_addr: String,
    pub retry_initial_delay_ms: u64,
    pub retry_max_attempts: u32,
    /// High-water floor for a cache that has never seen a modification time.
    pub initial_modification_time: DateTime<Utc>,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or("DATABASE_URL is required")?;

        let workflow_definition_path =
            lookup("WORKFLOW_DEFINITION_PATH").ok_or("WORKFLOW_DEFINITION_PATH is required")?;

        let operational_period_start_seconds = parse_or(
            &lookup,
            "OPERATIONAL_PERIOD_START_SECONDS",
            DEFAULT_OPERATIONAL_PERIOD_START_SECONDS,
        )?;

        let operational_period_end_seconds = parse_or(
            &lookup,
            "OPERATIONAL_PERIOD_END_SECONDS",
            DEFAULT_OPERATIONAL_PERIOD_END_SECONDS,
        )?;

        let polling_period_seconds =
            parse_or(&lookup, "POLLING_PERIOD_SECONDS", DEFAULT_POLLING_PERIOD_SECONDS)?;

        let interval_event_type = lookup("INTERVAL_EVENT_TYPE")
            .unwrap_or_else(|| DEFAULT_INTERVAL_EVENT_TYPE.to_string());

        let event_bus_url = lookup("EVENT_BUS_URL").filter(|url| !url.trim().is_empty());

        let event_bus_timeout_ms =
            parse_or(&lookup, "EVENT_BUS_TIMEOUT_MS", DEFAULT_EVENT_BUS_TIMEOUT_MS)?;

        let api_bind_addr =
            lookup("API_BIND_ADDR").unwrap_or_else(|| DEFAULT_API_BIND_ADDR.to_string());

        let retry_initial_delay_ms =
            parse_or(&lookup, "RETRY_INITIAL_DELAY_MS", DEFAULT_RETRY_INITIAL_DELAY_MS)?;

        let retry_max_attempts =
            parse_or(&lookup, "RETRY_MAX_ATTEMPTS", DEFAULT_RETRY_MAX_ATTEMPTS)?;

        let initial_modification_time = match lookup("INITIAL_MODIFICATION_TIME") {
            Some(raw) => DateTime::parse_from_rfc3339(&raw)
                .map_err(|_| "INITIAL_MODIFICATION_TIME must be an RFC 3339 timestamp")?
                .with_timezone(&Utc),
            None => DateTime::<Utc>::UNIX_EPOCH,
        };

        let config = Self {
            database_url,
            workflow_definition_path,
            operational_period_start_seconds,
            operational_period_end_seconds,
            polling_period_seconds,
            interval_event_type,
            event_bus_url,
            event_bus_timeout_ms,
            api_bind_addr,
            retry_initial_delay_ms,
            retry_max_attempts,
            initial_modification_time,
        };
        config.validate()?;
        Ok(config)
    }

    /// Apply CLI overrides on top of the environment.
    pub fn apply_cli(mut self, cli: &Cli) -> Result<Self, String> {
        if let Some(url) = &cli.database_url {
            self.database_url = url.clone();
        }
        if let Some(path) = &cli.workflow_definition {
            self.workflow_definition_path = path.clone();
        }
        if let Some(seconds) = cli.polling_period {
            self.polling_period_seconds = seconds;
        }
        if let Some(addr) = &cli.bind {
            self.api_bind_addr = addr.clone();
        }
        if let Some(url) = &cli.event_bus_url {
            self.event_bus_url = Some(url.clone());
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), String> {
        if !(1..=MAX_POLLING_PERIOD_SECONDS).contains(&self.polling_period_seconds) {
            return Err(format!(
                "POLLING_PERIOD_SECONDS must be between 1 and {}",
                MAX_POLLING_PERIOD_SECONDS
            ));
        }
        for (key, offset) in [
            ("OPERATIONAL_PERIOD_START_SECONDS", self.operational_period_start_seconds),
            ("OPERATIONAL_PERIOD_END_SECONDS", self.operational_period_end_seconds),
        ] {
            if offset.unsigned_abs() > MAX_OPERATIONAL_OFFSET_SECONDS.unsigned_abs() {
                return Err(format!(
                    "{} must be within +/-{} seconds",
                    key, MAX_OPERATIONAL_OFFSET_SECONDS
                ));
            }
        }
        if self.operational_period_start_seconds < self.operational_period_end_seconds {
            return Err(format!(
                "OPERATIONAL_PERIOD_START_SECONDS ({}) must not be less than \
                 OPERATIONAL_PERIOD_END_SECONDS ({})",
                self.operational_period_start_seconds, self.operational_period_end_seconds
            ));
        }
        if self.retry_initial_delay_ms > MAX_RETRY_INITIAL_DELAY_MS {
            return Err(format!(
                "RETRY_INITIAL_DELAY_MS must not exceed {}",
                MAX_RETRY_INITIAL_DELAY_MS
            ));
        }
        if !(1..=MAX_EVENT_BUS_TIMEOUT_MS).contains(&self.event_bus_timeout_ms) {
            return Err(format!(
                "EVENT_BUS_TIMEOUT_MS must be between 1 and {}",
                MAX_EVENT_BUS_TIMEOUT_MS
            ));
        }
        Ok(())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            // validate() keeps both offsets far below chrono's limits
            operational_start_offset: chrono::Duration::seconds(
                self.operational_period_start_seconds,
            ),
            operational_end_offset: chrono::Duration::seconds(self.operational_period_end_seconds),
            polling_period: Duration::from_secs(self.polling_period_seconds),
            event_type: self.interval_event_type.clone(),
        }
    }

    pub fn event_bus_timeout(&self) -> Duration {
        Duration::from_millis(self.event_bus_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.retry_initial_delay_ms),
            self.retry_max_attempts,
        )
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, String>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| format!("{} must be a valid number", key)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use clap::Parser;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("DATABASE_URL", "sqlite::memory:"),
        ("WORKFLOW_DEFINITION_PATH", "workflow.json"),
    ];

    #[test]
    fn defaults_apply_when_optional_keys_missing() {
        let config = Config::from_lookup(lookup_from(&REQUIRED)).unwrap();

        assert_eq!(config.operational_period_start_seconds, 86_400);
        assert_eq!(config.operational_period_end_seconds, 0);
        assert_eq!(config.polling_period_seconds, 30);
        assert_eq!(config.interval_event_type, "intervals");
        assert_eq!(config.api_bind_addr, "0.0.0.0:8080");
        assert!(config.event_bus_url.is_none());
        assert_eq!(config.event_bus_timeout(), Duration::from_secs(5));
        assert_eq!(config.initial_modification_time, DateTime::<Utc>::UNIX_EPOCH);

        let policy = config.retry_policy();
        assert_eq!(policy.initial_delay, Duration::from_millis(500));
        assert_eq!(policy.max_attempts, 3);
    }

    #[test]
    fn missing_database_url_is_an_error() {
        let err = Config::from_lookup(lookup_from(&[("WORKFLOW_DEFINITION_PATH", "w.json")]))
            .unwrap_err();
        assert_eq!(err, "DATABASE_URL is required");
    }

    #[test]
    fn non_numeric_polling_period_is_an_error() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("POLLING_PERIOD_SECONDS", "soon"));
        let err = Config::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert_eq!(err, "POLLING_PERIOD_SECONDS must be a valid number");
    }

    #[test]
    fn inverted_operational_period_is_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("OPERATIONAL_PERIOD_START_SECONDS", "60"));
        pairs.push(("OPERATIONAL_PERIOD_END_SECONDS", "120"));
        assert!(Config::from_lookup(lookup_from(&pairs)).is_err());
    }

    #[test]
    fn out_of_range_offsets_are_rejected() {
        for (key, value) in [
            ("OPERATIONAL_PERIOD_START_SECONDS", i64::MAX.to_string()),
            ("OPERATIONAL_PERIOD_END_SECONDS", i64::MIN.to_string()),
            ("OPERATIONAL_PERIOD_START_SECONDS", "3153600001".to_string()),
        ] {
            let mut pairs = REQUIRED.to_vec();
            pairs.push((key, value.as_str()));
            let err = Config::from_lookup(lookup_from(&pairs)).unwrap_err();
            assert!(err.starts_with(key), "{}", err);
        }

        // the boundary itself still builds a scheduler config
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("OPERATIONAL_PERIOD_START_SECONDS", "3153600000"));
        let config = Config::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(
            config.scheduler_config().operational_start_offset,
            chrono::Duration::days(100 * 365)
        );
    }

    #[test]
    fn oversized_delays_are_rejected() {
        for (key, value) in [
            ("RETRY_INITIAL_DELAY_MS", u64::MAX.to_string()),
            ("EVENT_BUS_TIMEOUT_MS", "0".to_string()),
            ("EVENT_BUS_TIMEOUT_MS", "300001".to_string()),
            ("POLLING_PERIOD_SECONDS", u64::MAX.to_string()),
        ] {
            let mut pairs = REQUIRED.to_vec();
            pairs.push((key, value.as_str()));
            let err = Config::from_lookup(lookup_from(&pairs)).unwrap_err();
            assert!(err.starts_with(key), "{}", err);
        }
    }

    #[test]
    fn scheduler_config_carries_offsets_and_event_type() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("OPERATIONAL_PERIOD_START_SECONDS", "3600"));
        pairs.push(("OPERATIONAL_PERIOD_END_SECONDS", "60"));
        pairs.push(("INTERVAL_EVENT_TYPE", "stage-intervals"));
        pairs.push(("INITIAL_MODIFICATION_TIME", "2024-01-01T00:00:00Z"));
        let config = Config::from_lookup(lookup_from(&pairs)).unwrap();

        let scheduler = config.scheduler_config();
        assert_eq!(scheduler.operational_start_offset, chrono::Duration::hours(1));
        assert_eq!(scheduler.operational_end_offset, chrono::Duration::minutes(1));
        assert_eq!(scheduler.event_type, "stage-intervals");
        assert_eq!(
            config.initial_modification_time.to_rfc3339(),
            "2024-01-01T00:00:00+00:00"
        );
    }

    #[test]
    fn cli_overrides_environment() {
        let config = Config::from_lookup(lookup_from(&REQUIRED)).unwrap();
        let cli = Cli::parse_from([
            "workflow-manager",
            "--polling-period",
            "5",
            "--bind",
            "127.0.0.1:9000",
            "--event-bus-url",
            "http://bus.local/events",
        ]);

        let config = config.apply_cli(&cli).unwrap();
        assert_eq!(config.polling_period_seconds, 5);
        assert_eq!(config.api_bind_addr, "127.0.0.1:9000");
        assert_eq!(config.event_bus_url.as_deref(), Some("http://bus.local/events"));
        assert_eq!(config.database_url, "sqlite::memory:");
    }

    #[test]
    fn cli_cannot_set_zero_polling_period() {
        let config = Config::from_lookup(lookup_from(&REQUIRED)).unwrap();
        let cli = Cli::parse_from(["workflow-manager", "--polling-period", "0"]);
        assert!(config.apply_cli(&cli).is_err());
    }
}
