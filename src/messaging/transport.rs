//! # Job Transport Contract
//!
//! The opaque queue interface the admission and dead-letter subsystems are
//! written against. Implementations must be safe for concurrent use from
//! every worker and producer.

use crate::constants::{CatalogTier, CrawlReason};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Envelope pushed onto a transport queue for a single crawl job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlJobEnvelope {
    /// Transport-level deduplication identifier
    pub job_id: String,

    /// Content source this crawl targets
    pub source_id: String,

    /// Catalog tier of the content being crawled
    pub catalog_tier: CatalogTier,

    /// Why the job was requested
    pub reason: CrawlReason,

    /// Queue priority; lower runs first where the transport supports it
    pub priority: i32,

    /// Opaque job data needed to execute (and replay) the crawl
    pub payload: serde_json::Value,

    pub enqueued_at: chrono::DateTime<chrono::Utc>,
}

/// Point-in-time job counts for a single queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub waiting: u64,
    pub active: u64,
    pub delayed: u64,
    pub failed: u64,
    pub completed: u64,
}

impl JobCounts {
    /// Backlog contribution to system health: jobs not yet being worked
    pub fn backlog(&self) -> u64 {
        self.waiting + self.delayed
    }
}

/// Opaque FIFO/priority queue transport for crawl jobs
#[async_trait]
pub trait JobTransport: Send + Sync {
    /// Push one envelope onto the named queue, returning the transport
    /// message id
    async fn enqueue(&self, queue_name: &str, envelope: &CrawlJobEnvelope) -> Result<i64>;

    /// Current job counts for the named queue
    async fn job_counts(&self, queue_name: &str) -> Result<JobCounts>;

    /// Remove all pending messages from the named queue, returning how many
    /// were removed
    async fn drain(&self, queue_name: &str) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backlog_sums_waiting_and_delayed() {
        let counts = JobCounts {
            waiting: 3,
            active: 9,
            delayed: 4,
            failed: 2,
            completed: 100,
        };
        assert_eq!(counts.backlog(), 7);
    }

    #[test]
    fn test_envelope_serialization_round_trip() {
        let envelope = CrawlJobEnvelope {
            job_id: "crawl-src-1-42".to_string(),
            source_id: "src-1".to_string(),
            catalog_tier: CatalogTier::B,
            reason: CrawlReason::Enrichment,
            priority: 2,
            payload: serde_json::json!({"series_id": 42}),
            enqueued_at: chrono::Utc::now(),
        };

        let json = serde_json::to_string(&envelope).unwrap();
        let decoded: CrawlJobEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, envelope);
    }
}
