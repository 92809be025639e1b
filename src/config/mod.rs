//! # Governor Configuration
//!
//! Explicit, validated configuration for admission control, rate limiting,
//! health thresholds, and dead-letter handling. Configuration is loaded from
//! YAML with optional environment overrides and validated up front; there are
//! no silent fallbacks past that point. Queue policies are immutable after
//! load.
//!
//! ## Usage
//!
//! ```rust
//! use crawler_core::config::GovernorConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GovernorConfig::default().with_env_overrides()?;
//! config.validate()?;
//! println!("global cap: {}", config.global_max_concurrent);
//! # Ok(())
//! # }
//! ```

use crate::constants::defaults;
use crate::error::{CrawlerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Static per-queue admission policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuePolicy {
    /// Name of the transport queue this policy governs
    pub queue_name: String,

    /// Maximum in-flight jobs for this queue
    #[serde(default = "default_per_queue")]
    pub max_concurrent_per_queue: u32,

    /// Optional per-source ceiling within this queue
    #[serde(default)]
    pub max_concurrent_per_source: Option<u32>,

    /// Transport priority; lower runs first where supported
    #[serde(default)]
    pub priority: i32,
}

fn default_per_queue() -> u32 {
    defaults::MAX_CONCURRENT_PER_QUEUE
}

/// Token bucket shape for a content source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceRateLimit {
    /// Bucket capacity
    pub max_tokens: f64,

    /// Continuous refill rate in tokens per second
    pub refill_per_second: f64,
}

impl Default for SourceRateLimit {
    fn default() -> Self {
        Self {
            max_tokens: defaults::RATE_MAX_TOKENS,
            refill_per_second: defaults::RATE_REFILL_PER_SECOND,
        }
    }
}

/// Rate limiting configuration: one default shape plus per-source overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub default: SourceRateLimit,

    /// Per-source bucket overrides, keyed by source name
    #[serde(default)]
    pub overrides: HashMap<String, SourceRateLimit>,
}

impl RateLimitConfig {
    /// Bucket shape for a source, falling back to the default
    pub fn limit_for(&self, source: &str) -> SourceRateLimit {
        self.overrides.get(source).copied().unwrap_or(self.default)
    }
}

/// Queue-depth thresholds driving the tri-state health classification
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthThresholds {
    /// Aggregate waiting + delayed depth at which health becomes degraded
    pub degraded_at: u64,

    /// Aggregate depth at which health becomes maintenance
    pub maintenance_at: u64,

    /// Timeout for transport count queries before failing closed
    #[serde(default = "default_monitor_timeout_ms")]
    pub monitor_timeout_ms: u64,
}

fn default_monitor_timeout_ms() -> u64 {
    defaults::MONITOR_TIMEOUT_MS
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            degraded_at: defaults::DEGRADED_AT,
            maintenance_at: defaults::MAINTENANCE_AT,
            monitor_timeout_ms: defaults::MONITOR_TIMEOUT_MS,
        }
    }
}

impl HealthThresholds {
    pub fn monitor_timeout(&self) -> Duration {
        Duration::from_millis(self.monitor_timeout_ms)
    }
}

/// Ordered classification rule patterns. Permanent rules are evaluated
/// before transient rules; a message matching neither is Unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRules {
    pub permanent: Vec<String>,
    pub transient: Vec<String>,
}

impl Default for ClassificationRules {
    fn default() -> Self {
        Self {
            permanent: vec![
                r"(?i)\b404\b".to_string(),
                r"(?i)not[ _-]?found".to_string(),
                r"(?i)\b401\b|unauthori[sz]ed".to_string(),
                r"(?i)\b403\b|forbidden".to_string(),
                r"(?i)validation (failed|error)".to_string(),
                r"(?i)invalid (payload|request|input)".to_string(),
                r"(?i)unsupported source".to_string(),
            ],
            transient: vec![
                r"(?i)timed? ?out".to_string(),
                r"(?i)ETIMEDOUT|ECONNRESET|ECONNREFUSED|EPIPE".to_string(),
                r"(?i)connection (reset|refused|closed)".to_string(),
                r"(?i)rate.?limit|too many requests|\b429\b".to_string(),
                r"(?i)\b(500|502|503|504)\b".to_string(),
                r"(?i)ENOTFOUND|EAI_AGAIN|dns".to_string(),
                r"(?i)circuit breaker is open".to_string(),
                r"(?i)socket hang ?up".to_string(),
            ],
        }
    }
}

/// Dead-letter queue behavior settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DlqConfig {
    /// Days a resolved record is retained before pruning
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,

    /// Prefix length of the error message used as the analyze grouping key
    #[serde(default = "default_prefix_len")]
    pub error_group_prefix_len: usize,

    /// Hard cap on listing page size
    #[serde(default = "default_max_page_size")]
    pub max_page_size: i64,

    /// Classification rule patterns, data not code
    #[serde(default)]
    pub classification: ClassificationRules,
}

fn default_retention_days() -> i64 {
    defaults::DLQ_RETENTION_DAYS
}

fn default_prefix_len() -> usize {
    defaults::ERROR_GROUP_PREFIX_LEN
}

fn default_max_page_size() -> i64 {
    defaults::MAX_PAGE_SIZE
}

impl Default for DlqConfig {
    fn default() -> Self {
        Self {
            retention_days: defaults::DLQ_RETENTION_DAYS,
            error_group_prefix_len: defaults::ERROR_GROUP_PREFIX_LEN,
            max_page_size: defaults::MAX_PAGE_SIZE,
            classification: ClassificationRules::default(),
        }
    }
}

/// Root configuration for the admission and governance subsystem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernorConfig {
    /// Global in-flight job ceiling across every queue
    #[serde(default = "default_global_max")]
    pub global_max_concurrent: u32,

    /// Per-queue policies; also defines the monitored queue set
    #[serde(default)]
    pub queues: Vec<QueuePolicy>,

    #[serde(default)]
    pub rate_limits: RateLimitConfig,

    #[serde(default)]
    pub health: HealthThresholds,

    /// Optional TTL on capacity leases; None disables expiry
    #[serde(default)]
    pub lease_ttl_seconds: Option<u64>,

    #[serde(default)]
    pub dlq: DlqConfig,
}

fn default_global_max() -> u32 {
    defaults::GLOBAL_MAX_CONCURRENT
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            global_max_concurrent: defaults::GLOBAL_MAX_CONCURRENT,
            queues: Vec::new(),
            rate_limits: RateLimitConfig::default(),
            health: HealthThresholds::default(),
            lease_ttl_seconds: None,
            dlq: DlqConfig::default(),
        }
    }
}

impl GovernorConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Loading governor configuration");
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CrawlerError::configuration(
                "config_file",
                format!("failed to read {}: {e}", path.display()),
            )
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: GovernorConfig = serde_yaml::from_str(contents)
            .map_err(|e| CrawlerError::configuration("yaml", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides on top of the loaded values
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(value) = std::env::var("CRAWLER_GLOBAL_MAX_CONCURRENT") {
            self.global_max_concurrent = value.parse().map_err(|e| {
                CrawlerError::configuration(
                    "CRAWLER_GLOBAL_MAX_CONCURRENT",
                    format!("invalid value: {e}"),
                )
            })?;
        }

        if let Ok(value) = std::env::var("CRAWLER_DEGRADED_AT") {
            self.health.degraded_at = value.parse().map_err(|e| {
                CrawlerError::configuration("CRAWLER_DEGRADED_AT", format!("invalid value: {e}"))
            })?;
        }

        if let Ok(value) = std::env::var("CRAWLER_MAINTENANCE_AT") {
            self.health.maintenance_at = value.parse().map_err(|e| {
                CrawlerError::configuration("CRAWLER_MAINTENANCE_AT", format!("invalid value: {e}"))
            })?;
        }

        if let Ok(value) = std::env::var("CRAWLER_DLQ_RETENTION_DAYS") {
            self.dlq.retention_days = value.parse().map_err(|e| {
                CrawlerError::configuration(
                    "CRAWLER_DLQ_RETENTION_DAYS",
                    format!("invalid value: {e}"),
                )
            })?;
        }

        Ok(self)
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.global_max_concurrent == 0 {
            return Err(CrawlerError::configuration(
                "global_max_concurrent",
                "must be greater than zero",
            ));
        }

        if self.health.maintenance_at <= self.health.degraded_at {
            return Err(CrawlerError::configuration(
                "health.maintenance_at",
                "must be greater than degraded_at",
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for policy in &self.queues {
            if policy.queue_name.is_empty() {
                return Err(CrawlerError::configuration(
                    "queues.queue_name",
                    "queue name must not be empty",
                ));
            }
            // Queue names end up inside quoted SQL identifiers on the pgmq
            // tables, so they are restricted to an identifier-safe charset.
            if !policy
                .queue_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                return Err(CrawlerError::configuration(
                    "queues.queue_name",
                    format!(
                        "queue name '{}' may only contain ASCII letters, digits, '_' and '-'",
                        policy.queue_name
                    ),
                ));
            }
            if !seen.insert(policy.queue_name.as_str()) {
                return Err(CrawlerError::configuration(
                    "queues",
                    format!("duplicate queue policy for '{}'", policy.queue_name),
                ));
            }
            if policy.max_concurrent_per_queue == 0 {
                return Err(CrawlerError::configuration(
                    "queues.max_concurrent_per_queue",
                    format!("must be greater than zero for '{}'", policy.queue_name),
                ));
            }
            if policy.max_concurrent_per_source == Some(0) {
                return Err(CrawlerError::configuration(
                    "queues.max_concurrent_per_source",
                    format!("must be greater than zero for '{}'", policy.queue_name),
                ));
            }
        }

        if self.rate_limits.default.refill_per_second <= 0.0
            || self.rate_limits.default.max_tokens <= 0.0
        {
            return Err(CrawlerError::configuration(
                "rate_limits.default",
                "max_tokens and refill_per_second must be positive",
            ));
        }
        for (source, limit) in &self.rate_limits.overrides {
            if limit.refill_per_second <= 0.0 || limit.max_tokens <= 0.0 {
                return Err(CrawlerError::configuration(
                    "rate_limits.overrides",
                    format!("max_tokens and refill_per_second must be positive for '{source}'"),
                ));
            }
        }

        if self.dlq.error_group_prefix_len == 0 {
            return Err(CrawlerError::configuration(
                "dlq.error_group_prefix_len",
                "must be greater than zero",
            ));
        }
        if self.dlq.max_page_size <= 0 {
            return Err(CrawlerError::configuration(
                "dlq.max_page_size",
                "must be greater than zero",
            ));
        }

        Ok(())
    }

    /// Policy for a queue, if one is configured
    pub fn policy_for(&self, queue_name: &str) -> Option<&QueuePolicy> {
        self.queues.iter().find(|p| p.queue_name == queue_name)
    }

    /// Names of every governed queue, in policy order
    pub fn queue_names(&self) -> Vec<String> {
        self.queues.iter().map(|p| p.queue_name.clone()).collect()
    }

    /// Lease TTL as a duration, if leasing is enabled
    pub fn lease_ttl(&self) -> Option<Duration> {
        self.lease_ttl_seconds.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml() -> &'static str {
        r#"
global_max_concurrent: 8
queues:
  - queue_name: crawl-metadata
    max_concurrent_per_queue: 4
    max_concurrent_per_source: 2
    priority: 1
  - queue_name: crawl-chapters
    max_concurrent_per_queue: 2
rate_limits:
  default:
    max_tokens: 5.0
    refill_per_second: 0.5
  overrides:
    slow-source:
      max_tokens: 2.0
      refill_per_second: 0.1
health:
  degraded_at: 100
  maintenance_at: 400
dlq:
  retention_days: 14
"#
    }

    #[test]
    fn test_default_config_validates() {
        GovernorConfig::default().validate().unwrap();
    }

    #[test]
    fn test_yaml_loading() {
        let config = GovernorConfig::from_yaml_str(sample_yaml()).unwrap();
        assert_eq!(config.global_max_concurrent, 8);
        assert_eq!(config.queues.len(), 2);
        assert_eq!(
            config.policy_for("crawl-metadata").unwrap().max_concurrent_per_source,
            Some(2)
        );
        // Unspecified fields fall back to serde defaults
        assert_eq!(config.policy_for("crawl-chapters").unwrap().priority, 0);
        assert_eq!(config.dlq.retention_days, 14);
        assert_eq!(config.dlq.max_page_size, 100);
    }

    #[test]
    fn test_rate_limit_override_lookup() {
        let config = GovernorConfig::from_yaml_str(sample_yaml()).unwrap();
        let slow = config.rate_limits.limit_for("slow-source");
        assert_eq!(slow.max_tokens, 2.0);
        let other = config.rate_limits.limit_for("anything-else");
        assert_eq!(other.max_tokens, 5.0);
    }

    #[test]
    fn test_threshold_ordering_rejected() {
        let mut config = GovernorConfig::default();
        config.health.degraded_at = 500;
        config.health.maintenance_at = 500;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_queue_rejected() {
        let mut config = GovernorConfig::default();
        config.queues = vec![
            QueuePolicy {
                queue_name: "q".to_string(),
                max_concurrent_per_queue: 1,
                max_concurrent_per_source: None,
                priority: 0,
            },
            QueuePolicy {
                queue_name: "q".to_string(),
                max_concurrent_per_queue: 2,
                max_concurrent_per_source: None,
                priority: 0,
            },
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_identifier_queue_name_rejected() {
        for bad in [r#"q"; DROP TABLE x; --"#, "queue name", "queue.name"] {
            let mut config = GovernorConfig::default();
            config.queues = vec![QueuePolicy {
                queue_name: bad.to_string(),
                max_concurrent_per_queue: 1,
                max_concurrent_per_source: None,
                priority: 0,
            }];
            assert!(config.validate().is_err(), "accepted '{bad}'");
        }

        let mut config = GovernorConfig::default();
        config.queues = vec![QueuePolicy {
            queue_name: "crawl-metadata_v2".to_string(),
            max_concurrent_per_queue: 1,
            max_concurrent_per_source: None,
            priority: 0,
        }];
        config.validate().unwrap();
    }

    #[test]
    fn test_zero_per_source_cap_rejected() {
        let mut config = GovernorConfig::default();
        config.queues = vec![QueuePolicy {
            queue_name: "q".to_string(),
            max_concurrent_per_queue: 1,
            max_concurrent_per_source: Some(0),
            priority: 0,
        }];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("CRAWLER_GLOBAL_MAX_CONCURRENT", "99");
        let config = GovernorConfig::default().with_env_overrides().unwrap();
        std::env::remove_var("CRAWLER_GLOBAL_MAX_CONCURRENT");
        assert_eq!(config.global_max_concurrent, 99);
    }

    #[test]
    fn test_invalid_env_override_rejected() {
        std::env::set_var("CRAWLER_DEGRADED_AT", "not-a-number");
        let result = GovernorConfig::default().with_env_overrides();
        std::env::remove_var("CRAWLER_DEGRADED_AT");
        assert!(result.is_err());
    }

    #[test]
    fn test_file_loading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("governor.yaml");
        std::fs::write(&path, sample_yaml()).unwrap();
        let config = GovernorConfig::from_yaml_file(&path).unwrap();
        assert_eq!(config.health.degraded_at, 100);
    }
}
