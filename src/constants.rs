//! # System Constants and Shared Enums
//!
//! Core enums and default operational boundaries shared across the admission,
//! health, and dead-letter subsystems. Queue names, source names, catalog
//! tiers, and crawl reasons form a single naming domain: the same
//! (queue, source) pairs key concurrency counters, token buckets, and
//! failure records.

use serde::{Deserialize, Serialize};

/// Default operational limits, used when configuration omits a value
pub mod defaults {
    /// Global in-flight job ceiling across all queues
    pub const GLOBAL_MAX_CONCURRENT: u32 = 12;

    /// Per-queue in-flight ceiling when a policy does not override it
    pub const MAX_CONCURRENT_PER_QUEUE: u32 = 4;

    /// Aggregate queue depth at which the system reports degraded
    pub const DEGRADED_AT: u64 = 500;

    /// Aggregate queue depth at which the system reports maintenance
    pub const MAINTENANCE_AT: u64 = 2_000;

    /// Token bucket capacity for sources without an override
    pub const RATE_MAX_TOKENS: f64 = 10.0;

    /// Token refill rate (tokens per second) for sources without an override
    pub const RATE_REFILL_PER_SECOND: f64 = 1.0;

    /// Days a resolved failure record is retained before pruning
    pub const DLQ_RETENTION_DAYS: i64 = 30;

    /// Error-message prefix length used as the analyze() grouping key
    pub const ERROR_GROUP_PREFIX_LEN: usize = 64;

    /// Hard cap on page size for failure record listings
    pub const MAX_PAGE_SIZE: i64 = 100;

    /// Timeout for queue-depth sampling before health fails closed
    pub const MONITOR_TIMEOUT_MS: u64 = 2_000;
}

/// Coarse priority classification of the content a crawl job concerns.
///
/// Tier A content is served first under load; tier C is shed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CatalogTier {
    A,
    B,
    C,
}

impl CatalogTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogTier::A => "A",
            CatalogTier::B => "B",
            CatalogTier::C => "C",
        }
    }
}

impl std::fmt::Display for CatalogTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a crawl job was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlReason {
    /// Periodic scheduled refresh
    Scheduled,
    /// Triggered by an enrichment pipeline discovering missing data
    Enrichment,
    /// Explicit user-triggered force request, exempt from load shedding
    UserRequest,
    /// Bulk backfill of historical content
    Backfill,
}

impl CrawlReason {
    /// User-forced requests bypass health-based admission gates
    pub fn is_user_forced(&self) -> bool {
        matches!(self, CrawlReason::UserRequest)
    }
}

impl std::fmt::Display for CrawlReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CrawlReason::Scheduled => write!(f, "scheduled"),
            CrawlReason::Enrichment => write!(f, "enrichment"),
            CrawlReason::UserRequest => write!(f, "user_request"),
            CrawlReason::Backfill => write!(f, "backfill"),
        }
    }
}

/// Tri-state system health derived from aggregate queue depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Maintenance,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Maintenance => write!(f, "maintenance"),
        }
    }
}

/// Remediation class assigned to a failure record's error message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// May succeed on retry; eligible for auto-resolution
    Transient,
    /// Will never succeed if retried; requires human action
    Permanent,
    /// Matched no rule; treated like permanent but flagged distinctly
    Unknown,
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureClass::Transient => write!(f, "transient"),
            FailureClass::Permanent => write!(f, "permanent"),
            FailureClass::Unknown => write!(f, "unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_forced_reason() {
        assert!(CrawlReason::UserRequest.is_user_forced());
        assert!(!CrawlReason::Scheduled.is_user_forced());
        assert!(!CrawlReason::Enrichment.is_user_forced());
        assert!(!CrawlReason::Backfill.is_user_forced());
    }

    #[test]
    fn test_serde_snake_case_round_trip() {
        let json = serde_json::to_string(&HealthStatus::Maintenance).unwrap();
        assert_eq!(json, "\"maintenance\"");
        let status: HealthStatus = serde_json::from_str("\"degraded\"").unwrap();
        assert_eq!(status, HealthStatus::Degraded);
    }

    #[test]
    fn test_tier_display() {
        assert_eq!(CatalogTier::A.to_string(), "A");
        assert_eq!(CatalogTier::C.as_str(), "C");
    }
}
