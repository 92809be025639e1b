//! # In-Memory Job Transport
//!
//! Mutex-guarded transport used by tests and single-process development
//! runs. Supports injected job counts and forced enqueue failures so health
//! and retry edge cases can be exercised without a database.

use crate::error::{CrawlerError, Result};
use crate::messaging::transport::{CrawlJobEnvelope, JobCounts, JobTransport};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct Inner {
    queues: HashMap<String, Vec<CrawlJobEnvelope>>,
    counts_override: HashMap<String, JobCounts>,
    fail_enqueue: bool,
    fail_job_counts: bool,
    next_message_id: i64,
}

/// In-memory `JobTransport` implementation
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    inner: Mutex<Inner>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the reported job counts for a queue (health scenarios)
    pub fn set_job_counts(&self, queue_name: &str, counts: JobCounts) {
        self.inner
            .lock()
            .counts_override
            .insert(queue_name.to_string(), counts);
    }

    /// Make every subsequent enqueue fail (transport-unavailable scenarios)
    pub fn fail_enqueues(&self, fail: bool) {
        self.inner.lock().fail_enqueue = fail;
    }

    /// Make every subsequent count query fail (monitor fail-closed scenarios)
    pub fn fail_job_counts(&self, fail: bool) {
        self.inner.lock().fail_job_counts = fail;
    }

    /// Envelopes currently sitting on a queue
    pub fn enqueued(&self, queue_name: &str) -> Vec<CrawlJobEnvelope> {
        self.inner
            .lock()
            .queues
            .get(queue_name)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of envelopes currently sitting on a queue
    pub fn enqueued_count(&self, queue_name: &str) -> usize {
        self.inner
            .lock()
            .queues
            .get(queue_name)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl JobTransport for InMemoryTransport {
    async fn enqueue(&self, queue_name: &str, envelope: &CrawlJobEnvelope) -> Result<i64> {
        let mut inner = self.inner.lock();
        if inner.fail_enqueue {
            return Err(CrawlerError::transport(
                queue_name,
                "enqueue",
                "transport unavailable",
            ));
        }

        inner.next_message_id += 1;
        let message_id = inner.next_message_id;
        inner
            .queues
            .entry(queue_name.to_string())
            .or_default()
            .push(envelope.clone());
        Ok(message_id)
    }

    async fn job_counts(&self, queue_name: &str) -> Result<JobCounts> {
        let inner = self.inner.lock();
        if inner.fail_job_counts {
            return Err(CrawlerError::transport(
                queue_name,
                "job_counts",
                "transport unavailable",
            ));
        }
        if let Some(counts) = inner.counts_override.get(queue_name) {
            return Ok(*counts);
        }

        let waiting = inner.queues.get(queue_name).map_or(0, Vec::len) as u64;
        Ok(JobCounts {
            waiting,
            ..JobCounts::default()
        })
    }

    async fn drain(&self, queue_name: &str) -> Result<u64> {
        let mut inner = self.inner.lock();
        let drained = inner
            .queues
            .get_mut(queue_name)
            .map_or(0, |q| std::mem::take(q).len());
        Ok(drained as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{CatalogTier, CrawlReason};

    fn envelope(job_id: &str) -> CrawlJobEnvelope {
        CrawlJobEnvelope {
            job_id: job_id.to_string(),
            source_id: "src".to_string(),
            catalog_tier: CatalogTier::A,
            reason: CrawlReason::Scheduled,
            priority: 0,
            payload: serde_json::json!({}),
            enqueued_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_enqueue_and_counts() {
        let transport = InMemoryTransport::new();
        transport.enqueue("q", &envelope("a")).await.unwrap();
        transport.enqueue("q", &envelope("b")).await.unwrap();

        let counts = transport.job_counts("q").await.unwrap();
        assert_eq!(counts.waiting, 2);
        assert_eq!(transport.enqueued_count("q"), 2);
    }

    #[tokio::test]
    async fn test_drain_empties_queue() {
        let transport = InMemoryTransport::new();
        transport.enqueue("q", &envelope("a")).await.unwrap();
        assert_eq!(transport.drain("q").await.unwrap(), 1);
        assert_eq!(transport.enqueued_count("q"), 0);
    }

    #[tokio::test]
    async fn test_counts_override_wins() {
        let transport = InMemoryTransport::new();
        transport.set_job_counts(
            "q",
            JobCounts {
                waiting: 10,
                delayed: 5,
                ..JobCounts::default()
            },
        );
        let counts = transport.job_counts("q").await.unwrap();
        assert_eq!(counts.backlog(), 15);
    }

    #[tokio::test]
    async fn test_forced_enqueue_failure() {
        let transport = InMemoryTransport::new();
        transport.fail_enqueues(true);
        assert!(transport.enqueue("q", &envelope("a")).await.is_err());
        transport.fail_enqueues(false);
        assert!(transport.enqueue("q", &envelope("a")).await.is_ok());
    }
}
