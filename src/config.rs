//! Store Configuration
//!
//! Recognised options:
//!
//! | Option               | Default     | Meaning                                      |
//! |----------------------|-------------|----------------------------------------------|
//! | `bucket`             | `_sessions` | Storage namespace for session records        |
//! | `reap_interval_ms`   | `0`         | Reaper period; `0` disables reaping          |
//! | `default_expiration` | `"none"`    | Policy for records written without an expiry |
//! | `client_options`     | `{}`        | Passed through to the storage client         |
//!
//! ## Example
//!
//! ```
//! use kvsession::config::{ExpirationPolicy, StoreConfig};
//! use std::time::Duration;
//!
//! let config = StoreConfig::from_json(
//!     r#"{"bucket": "web", "reap_interval_ms": 60000, "default_expiration": {"fixed_ttl": 86400000}}"#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.bucket, "web");
//! assert_eq!(config.reap_interval(), Some(Duration::from_secs(60)));
//! assert_eq!(
//!     config.default_expiration,
//!     ExpirationPolicy::FixedTtl(Duration::from_secs(86400))
//! );
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// The default bucket name for session records.
pub const DEFAULT_BUCKET: &str = "_sessions";

/// Errors produced while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// What to do with records written without an expiration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpirationPolicy {
    /// No index entry; the record is never reaped by timestamp
    #[default]
    None,

    /// Index the record as expiring this long after it was written
    FixedTtl(#[serde(with = "duration_ms")] Duration),
}

impl ExpirationPolicy {
    /// The expiration to index for a record written at `now` without one.
    pub fn expiry_from(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            ExpirationPolicy::None => None,
            ExpirationPolicy::FixedTtl(ttl) => chrono::Duration::from_std(*ttl)
                .ok()
                .and_then(|ttl| now.checked_add_signed(ttl)),
        }
    }
}

/// Configuration for a session backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Storage namespace for session records
    pub bucket: String,

    /// Reaper period in milliseconds (0 = reaping disabled)
    pub reap_interval_ms: u64,

    /// Policy for records without an expiration
    pub default_expiration: ExpirationPolicy,

    /// Opaque storage client connection parameters
    pub client_options: BTreeMap<String, String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            bucket: DEFAULT_BUCKET.to_string(),
            reap_interval_ms: 0,
            default_expiration: ExpirationPolicy::None,
            client_options: BTreeMap::new(),
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: StoreConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    pub fn with_reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval_ms = saturating_millis(interval);
        self
    }

    pub fn with_default_expiration(mut self, policy: ExpirationPolicy) -> Self {
        self.default_expiration = policy;
        self
    }

    pub fn with_client_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.client_options.insert(key.into(), value.into());
        self
    }

    /// The reaper period, or `None` when reaping is disabled.
    pub fn reap_interval(&self) -> Option<Duration> {
        (self.reap_interval_ms > 0).then(|| Duration::from_millis(self.reap_interval_ms))
    }

    /// Checks invariants serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket.trim().is_empty() {
            return Err(ConfigError::Invalid("bucket must not be empty".into()));
        }
        if self.default_expiration == ExpirationPolicy::FixedTtl(Duration::ZERO) {
            return Err(ConfigError::Invalid(
                "default_expiration fixed_ttl must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub(crate) fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Serializes a `Duration` as integer milliseconds.
mod duration_ms {
    use super::saturating_millis;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(saturating_millis(*duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.bucket, "_sessions");
        assert_eq!(config.reap_interval(), None);
        assert_eq!(config.default_expiration, ExpirationPolicy::None);
        assert!(config.client_options.is_empty());
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        assert_eq!(StoreConfig::from_json("{}").unwrap(), StoreConfig::default());
    }

    #[test]
    fn test_zero_interval_disables_reaping() {
        let config = StoreConfig::new().with_reap_interval(Duration::ZERO);
        assert_eq!(config.reap_interval(), None);

        let config = StoreConfig::new().with_reap_interval(Duration::from_millis(250));
        assert_eq!(config.reap_interval(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_huge_durations_saturate() {
        let config = StoreConfig::new().with_reap_interval(Duration::MAX);
        assert_eq!(config.reap_interval_ms, u64::MAX);
        assert!(config.reap_interval().is_some());

        // 2^64 ms would wrap to zero and silently disable reaping
        let wraps = Duration::from_millis(u64::MAX) + Duration::from_millis(1);
        assert_eq!(StoreConfig::new().with_reap_interval(wraps).reap_interval_ms, u64::MAX);

        let config = StoreConfig::new()
            .with_default_expiration(ExpirationPolicy::FixedTtl(Duration::MAX));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["default_expiration"]["fixed_ttl"], serde_json::json!(u64::MAX));
    }

    #[test]
    fn test_client_options_pass_through() {
        let config = StoreConfig::from_json(
            r#"{"client_options": {"host": "riak.internal", "port": "8098"}}"#,
        )
        .unwrap();

        assert_eq!(config.client_options.get("host").map(String::as_str), Some("riak.internal"));
        assert_eq!(config.client_options.len(), 2);
    }

    #[test]
    fn test_policy_round_trip() {
        let config = StoreConfig::new()
            .with_default_expiration(ExpirationPolicy::FixedTtl(Duration::from_secs(30)));
        let json = serde_json::to_string(&config).unwrap();

        assert!(json.contains(r#""default_expiration":{"fixed_ttl":30000}"#));
        assert_eq!(StoreConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_invalid_documents() {
        assert!(matches!(
            StoreConfig::from_json(r#"{"bucket": "  "}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            StoreConfig::from_json(r#"{"default_expiration": {"fixed_ttl": 0}}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            StoreConfig::from_json(r#"{"reap_interval_ms": "soon"}"#),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_expiry_from() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap();

        assert_eq!(ExpirationPolicy::None.expiry_from(now), None);
        assert_eq!(
            ExpirationPolicy::FixedTtl(Duration::from_secs(3600)).expiry_from(now),
            Some(Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap())
        );
    }
}
