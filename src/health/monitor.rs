//! # System Health Monitor
//!
//! Samples waiting + delayed job counts across the governed queue set and
//! classifies the total against fixed thresholds: `maintenance` at or above
//! the maintenance threshold, `degraded` at or above the degraded threshold,
//! `healthy` below both. Count queries run under a short timeout; a timeout
//! or transport error fails closed to `degraded` rather than reporting a
//! health the monitor cannot verify.

use crate::config::HealthThresholds;
use crate::constants::HealthStatus;
use crate::messaging::{JobCounts, JobTransport};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Derived system health; no lifecycle beyond the query that produced it
#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub status: HealthStatus,
    pub queue_depth: u64,
    pub thresholds: HealthThresholds,
}

/// Per-queue job counts for the health report surface
#[derive(Debug, Clone, Serialize)]
pub struct QueueHealth {
    pub name: String,
    #[serde(flatten)]
    pub counts: JobCounts,
}

/// Read-only queue depth sampler
pub struct SystemHealthMonitor {
    transport: Arc<dyn JobTransport>,
    queue_names: Vec<String>,
    thresholds: HealthThresholds,
}

impl SystemHealthMonitor {
    pub fn new(
        transport: Arc<dyn JobTransport>,
        queue_names: Vec<String>,
        thresholds: HealthThresholds,
    ) -> Self {
        Self {
            transport,
            queue_names,
            thresholds,
        }
    }

    /// Current system health from live queue depths
    pub async fn system_health(&self) -> SystemHealth {
        let (queues, sampling_failed) = self.collect_queue_health().await;
        let queue_depth: u64 = queues.iter().map(|q| q.counts.backlog()).sum();

        let mut status = if queue_depth >= self.thresholds.maintenance_at {
            HealthStatus::Maintenance
        } else if queue_depth >= self.thresholds.degraded_at {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        // Fail closed: an unverifiable depth is never reported healthy
        if sampling_failed && status == HealthStatus::Healthy {
            status = HealthStatus::Degraded;
        }

        debug!(%status, queue_depth, sampling_failed, "System health sampled");
        SystemHealth {
            status,
            queue_depth,
            thresholds: self.thresholds,
        }
    }

    /// Per-queue counts for every monitored queue, plus whether any sample
    /// failed or timed out. Failed queues report zero counts.
    pub async fn collect_queue_health(&self) -> (Vec<QueueHealth>, bool) {
        let timeout = self.thresholds.monitor_timeout();
        let samples = join_all(self.queue_names.iter().map(|name| async move {
            let counts =
                tokio::time::timeout(timeout, self.transport.job_counts(name)).await;
            (name.clone(), counts)
        }))
        .await;

        let mut sampling_failed = false;
        let queues = samples
            .into_iter()
            .map(|(name, result)| {
                let counts = match result {
                    Ok(Ok(counts)) => counts,
                    Ok(Err(e)) => {
                        warn!(queue_name = %name, error = %e, "Queue count query failed");
                        sampling_failed = true;
                        JobCounts::default()
                    }
                    Err(_) => {
                        warn!(queue_name = %name, "Queue count query timed out");
                        sampling_failed = true;
                        JobCounts::default()
                    }
                };
                QueueHealth { name, counts }
            })
            .collect();

        (queues, sampling_failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::messaging::{CrawlJobEnvelope, InMemoryTransport};
    use async_trait::async_trait;
    use std::time::Duration;

    fn thresholds() -> HealthThresholds {
        HealthThresholds {
            degraded_at: 10,
            maintenance_at: 50,
            monitor_timeout_ms: 100,
        }
    }

    fn monitor_with_depths(depths: &[(&str, u64, u64)]) -> SystemHealthMonitor {
        let transport = Arc::new(InMemoryTransport::new());
        for (queue, waiting, delayed) in depths {
            transport.set_job_counts(
                queue,
                JobCounts {
                    waiting: *waiting,
                    delayed: *delayed,
                    ..JobCounts::default()
                },
            );
        }
        let names = depths.iter().map(|(q, _, _)| q.to_string()).collect();
        SystemHealthMonitor::new(transport, names, thresholds())
    }

    #[tokio::test]
    async fn test_healthy_below_thresholds() {
        let monitor = monitor_with_depths(&[("a", 3, 1), ("b", 2, 0)]);
        let health = monitor.system_health().await;
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.queue_depth, 6);
    }

    #[tokio::test]
    async fn test_degraded_at_threshold_inclusive() {
        let monitor = monitor_with_depths(&[("a", 7, 3)]);
        let health = monitor.system_health().await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.queue_depth, 10);
    }

    #[tokio::test]
    async fn test_maintenance_at_threshold_inclusive() {
        let monitor = monitor_with_depths(&[("a", 30, 0), ("b", 15, 5)]);
        let health = monitor.system_health().await;
        assert_eq!(health.status, HealthStatus::Maintenance);
        assert_eq!(health.queue_depth, 50);
    }

    #[tokio::test]
    async fn test_active_jobs_do_not_count_toward_depth() {
        let transport = Arc::new(InMemoryTransport::new());
        transport.set_job_counts(
            "a",
            JobCounts {
                waiting: 1,
                active: 500,
                completed: 10_000,
                ..JobCounts::default()
            },
        );
        let monitor =
            SystemHealthMonitor::new(transport, vec!["a".to_string()], thresholds());
        let health = monitor.system_health().await;
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.queue_depth, 1);
    }

    #[tokio::test]
    async fn test_count_failure_fails_closed_to_degraded() {
        let transport = Arc::new(InMemoryTransport::new());
        transport.fail_job_counts(true);
        let monitor =
            SystemHealthMonitor::new(transport, vec!["a".to_string()], thresholds());
        let health = monitor.system_health().await;
        assert_eq!(health.status, HealthStatus::Degraded);
    }

    /// Transport whose count query never completes within the monitor timeout
    struct StalledTransport;

    #[async_trait]
    impl JobTransport for StalledTransport {
        async fn enqueue(&self, _queue: &str, _envelope: &CrawlJobEnvelope) -> Result<i64> {
            Ok(1)
        }

        async fn job_counts(&self, _queue: &str) -> Result<JobCounts> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(JobCounts::default())
        }

        async fn drain(&self, _queue: &str) -> Result<u64> {
            Ok(0)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_closed_to_degraded() {
        let monitor = SystemHealthMonitor::new(
            Arc::new(StalledTransport),
            vec!["a".to_string()],
            thresholds(),
        );
        let health = monitor.system_health().await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.queue_depth, 0);
    }
}
