//! Configuration types for billedhenter

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Main configuration for one pipeline process
///
/// Constructed once per process and passed by reference into the pipeline
/// entry point; no ambient globals are consulted mid-run. All fields have
/// serde defaults so a partial config file deserializes cleanly.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Maximum number of records processed concurrently (default: 4)
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Shared API call rate limit across all workers
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Retry policy for transient API failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Timeout applied to each individual API call (default: 30 seconds)
    #[serde(default = "default_per_call_timeout", with = "duration_serde")]
    pub per_call_timeout: Duration,

    /// Header names recognized as the identifier column, matched
    /// case-insensitively (default: webkode, identifier, web code, webcode)
    #[serde(default = "default_identifier_column_aliases")]
    pub identifier_column_aliases: BTreeSet<String>,

    /// Sheet names preferred when the workbook has several
    /// (default: "Priser"; the first sheet is used when none match)
    #[serde(default = "default_sheet_name_aliases")]
    pub sheet_name_aliases: BTreeSet<String>,

    /// How many leading rows are scanned for the identifier header (default: 6)
    #[serde(default = "default_header_scan_rows")]
    pub header_scan_rows: usize,

    /// Maximum number of images packed into one archive (default: 300)
    #[serde(default = "default_max_archive_entries")]
    pub max_archive_entries: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            per_call_timeout: default_per_call_timeout(),
            identifier_column_aliases: default_identifier_column_aliases(),
            sheet_name_aliases: default_sheet_name_aliases(),
            header_scan_rows: default_header_scan_rows(),
            max_archive_entries: default_max_archive_entries(),
        }
    }
}

impl Config {
    /// Validate the configuration, returning a [`Error::Config`] naming the
    /// offending key on failure
    pub fn validate(&self) -> Result<()> {
        if self.concurrency_limit == 0 {
            return Err(Error::config(
                "must be greater than zero",
                "concurrency_limit",
            ));
        }
        if self.rate_limit.max_calls == 0 {
            return Err(Error::config(
                "must be greater than zero",
                "rate_limit.max_calls",
            ));
        }
        if self.rate_limit.interval.is_zero() {
            return Err(Error::config(
                "must be a positive duration",
                "rate_limit.interval",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::config(
                "must be greater than zero",
                "retry.max_attempts",
            ));
        }
        if self.per_call_timeout.is_zero() {
            return Err(Error::config(
                "must be a positive duration",
                "per_call_timeout",
            ));
        }
        if self.identifier_column_aliases.is_empty() {
            return Err(Error::config(
                "at least one alias is required",
                "identifier_column_aliases",
            ));
        }
        if self.header_scan_rows == 0 {
            return Err(Error::config(
                "must be greater than zero",
                "header_scan_rows",
            ));
        }
        if self.max_archive_entries == 0 {
            return Err(Error::config(
                "must be greater than zero",
                "max_archive_entries",
            ));
        }
        Ok(())
    }
}

/// API call rate limit: at most `max_calls` calls per `interval`
///
/// The limit is shared across all workers of a run; see
/// [`RateLimiter`](crate::rate_limiter::RateLimiter).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum calls allowed within one interval (default: 10)
    #[serde(default = "default_max_calls")]
    pub max_calls: u32,

    /// Length of the rate window (default: 1 second)
    #[serde(default = "default_rate_interval", with = "duration_serde")]
    pub interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls: default_max_calls(),
            interval: default_rate_interval(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum total attempts per call, including the first (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (default: 500 ms)
    #[serde(default = "default_initial_delay", with = "duration_millis_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 10 seconds)
    #[serde(default = "default_max_delay", with = "duration_millis_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

fn default_concurrency_limit() -> usize {
    4
}

fn default_per_call_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_identifier_column_aliases() -> BTreeSet<String> {
    ["webkode", "identifier", "web code", "webcode"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_sheet_name_aliases() -> BTreeSet<String> {
    ["Priser"].into_iter().map(String::from).collect()
}

fn default_header_scan_rows() -> usize {
    6
}

fn default_max_archive_entries() -> usize {
    300
}

fn default_max_calls() -> u32 {
    10
}

fn default_rate_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds, for sub-second delays)
mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.concurrency_limit, 4);
        assert_eq!(config.rate_limit.max_calls, 10);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.per_call_timeout, Duration::from_secs(30));
        assert_eq!(config.max_archive_entries, 300);
        assert!(config.identifier_column_aliases.contains("webkode"));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let config = Config {
            concurrency_limit: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        match err {
            Error::Config { key, .. } => assert_eq!(key.as_deref(), Some("concurrency_limit")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn zero_rate_interval_is_rejected() {
        let config = Config {
            rate_limit: RateLimitConfig {
                max_calls: 10,
                interval: Duration::ZERO,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_alias_set_is_rejected() {
        let config = Config {
            identifier_column_aliases: BTreeSet::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_json_deserializes_to_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.concurrency_limit, 4);
        assert_eq!(config.rate_limit.interval, Duration::from_secs(1));
        assert_eq!(config.retry.initial_delay, Duration::from_millis(500));
    }

    #[test]
    fn durations_round_trip_through_json() {
        let config = Config {
            per_call_timeout: Duration::from_secs(5),
            retry: RetryConfig {
                initial_delay: Duration::from_millis(250),
                ..Default::default()
            },
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.per_call_timeout, Duration::from_secs(5));
        assert_eq!(parsed.retry.initial_delay, Duration::from_millis(250));
    }

    #[test]
    fn partial_json_overrides_only_named_fields() {
        let config: Config =
            serde_json::from_str(r#"{"concurrency_limit": 8, "rate_limit": {"max_calls": 2}}"#)
                .unwrap();
        assert_eq!(config.concurrency_limit, 8);
        assert_eq!(config.rate_limit.max_calls, 2);
        // Unnamed fields keep their defaults
        assert_eq!(config.rate_limit.interval, Duration::from_secs(1));
        assert_eq!(config.retry.max_attempts, 3);
    }
}
