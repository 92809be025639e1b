//! # Crawl Gatekeeper
//!
//! Composes the health monitor, rate limiter, and concurrency governor into
//! the single admission decision for new crawl jobs. The check ordering is
//! deliberate: health and tier gates are cheap and global, so an overloaded
//! system fails fast before any per-source state is touched; the token spend
//! is last so a rejection never consumes rate limit capacity.
//!
//! Admission-denied is a normal negative result returned as data. Errors are
//! reserved for infrastructure failures (transport down, unknown queue).
//!
//! ## Decision sequence
//!
//! 1. Sample system health. Under `maintenance`, only tier A content and
//!    explicit user-forced requests get through. Under `degraded`, tiers A
//!    and B pass; anything else needs a user-forced reason.
//! 2. Spend one rate limit token for the target source; exhaustion rejects
//!    with `rate_limited`.
//! 3. Push exactly one envelope onto the transport queue.
//!
//! The in-flight governor is deliberately not consulted here: workers claim
//! capacity with [`ConcurrencyGovernor::try_start`] when they pick the job
//! up. Its snapshot feeds the health report for display only.

use crate::concurrency::{ConcurrencyGovernor, RateLimitStatus, RateLimiter};
use crate::config::{GovernorConfig, HealthThresholds};
use crate::constants::{CatalogTier, CrawlReason, HealthStatus};
use crate::error::{CrawlerError, Result};
use crate::health::{QueueHealth, SystemHealthMonitor};
use crate::messaging::{CrawlJobEnvelope, JobTransport};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// A request to enqueue one crawl job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlRequest {
    /// Target transport queue; must have a configured policy
    pub queue_name: String,

    /// Content source the crawl will hit
    pub source_id: String,

    pub catalog_tier: CatalogTier,
    pub reason: CrawlReason,

    /// Transport-level job identifier
    pub job_id: String,

    /// Opaque job data handed to the worker
    pub payload: serde_json::Value,
}

/// Why a request was admitted or rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionStatus {
    Healthy,
    Degraded,
    Maintenance,
    RateLimited,
}

impl From<HealthStatus> for AdmissionStatus {
    fn from(status: HealthStatus) -> Self {
        match status {
            HealthStatus::Healthy => AdmissionStatus::Healthy,
            HealthStatus::Degraded => AdmissionStatus::Degraded,
            HealthStatus::Maintenance => AdmissionStatus::Maintenance,
        }
    }
}

/// Outcome of an admission attempt. On rejection no state was changed
/// anywhere: no token spent, no counter touched, nothing enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdmissionDecision {
    pub admitted: bool,
    pub status: AdmissionStatus,
}

impl AdmissionDecision {
    fn admitted(status: AdmissionStatus) -> Self {
        Self {
            admitted: true,
            status,
        }
    }

    fn rejected(status: AdmissionStatus) -> Self {
        Self {
            admitted: false,
            status,
        }
    }
}

/// Aggregate health surface for the queue-health read endpoint
#[derive(Debug, Clone, Serialize)]
pub struct QueueHealthReport {
    pub status: HealthStatus,
    pub queue_depth: u64,
    pub thresholds: HealthThresholds,
    pub queues: Vec<QueueHealth>,
    pub rate_limits: Vec<RateLimitStatus>,
    /// Advisory in-flight usage for display; non-binding
    pub capacity: crate::concurrency::CapacitySnapshot,
}

/// Admission control front door for crawl producers
pub struct CrawlGatekeeper {
    config: GovernorConfig,
    transport: Arc<dyn JobTransport>,
    monitor: SystemHealthMonitor,
    rate_limiter: RateLimiter,
    governor: Arc<ConcurrencyGovernor>,
}

impl CrawlGatekeeper {
    pub fn new(
        config: GovernorConfig,
        transport: Arc<dyn JobTransport>,
        governor: Arc<ConcurrencyGovernor>,
    ) -> Self {
        let monitor = SystemHealthMonitor::new(
            Arc::clone(&transport),
            config.queue_names(),
            config.health,
        );
        let rate_limiter = RateLimiter::new(config.rate_limits.clone());

        info!(
            queue_count = config.queues.len(),
            degraded_at = config.health.degraded_at,
            maintenance_at = config.health.maintenance_at,
            "Crawl gatekeeper initialized"
        );

        Self {
            config,
            transport,
            monitor,
            rate_limiter,
            governor,
        }
    }

    /// Decide whether a crawl job may be enqueued, and enqueue it if so.
    ///
    /// Successful admission enqueues exactly one job. Rejection has no side
    /// effects. An unknown queue is a caller error, not a rejection.
    pub async fn enqueue_if_allowed(&self, request: CrawlRequest) -> Result<AdmissionDecision> {
        let Some(policy) = self.config.policy_for(&request.queue_name) else {
            return Err(CrawlerError::UnknownQueue {
                queue_name: request.queue_name,
            });
        };

        let health = self.monitor.system_health().await;

        match health.status {
            HealthStatus::Maintenance => {
                let exempt =
                    request.reason.is_user_forced() || request.catalog_tier == CatalogTier::A;
                if !exempt {
                    debug!(
                        source_id = %request.source_id,
                        tier = %request.catalog_tier,
                        reason = %request.reason,
                        "Rejected: system in maintenance"
                    );
                    return Ok(AdmissionDecision::rejected(AdmissionStatus::Maintenance));
                }
            }
            HealthStatus::Degraded => {
                let exempt = request.reason.is_user_forced()
                    || matches!(request.catalog_tier, CatalogTier::A | CatalogTier::B);
                if !exempt {
                    debug!(
                        source_id = %request.source_id,
                        tier = %request.catalog_tier,
                        "Rejected: system degraded, tier shed"
                    );
                    return Ok(AdmissionDecision::rejected(AdmissionStatus::Degraded));
                }
            }
            HealthStatus::Healthy => {}
        }

        if !self.rate_limiter.try_consume(&request.source_id, 1.0) {
            debug!(source_id = %request.source_id, "Rejected: source rate limited");
            return Ok(AdmissionDecision::rejected(AdmissionStatus::RateLimited));
        }

        let envelope = CrawlJobEnvelope {
            job_id: request.job_id,
            source_id: request.source_id,
            catalog_tier: request.catalog_tier,
            reason: request.reason,
            priority: policy.priority,
            payload: request.payload,
            enqueued_at: chrono::Utc::now(),
        };
        self.transport
            .enqueue(&request.queue_name, &envelope)
            .await?;

        info!(
            queue_name = %request.queue_name,
            job_id = %envelope.job_id,
            source_id = %envelope.source_id,
            status = %health.status,
            "Crawl job admitted"
        );
        Ok(AdmissionDecision::admitted(health.status.into()))
    }

    /// Current system health (status, depth, thresholds)
    pub async fn system_health(&self) -> crate::health::SystemHealth {
        self.monitor.system_health().await
    }

    /// Full queue-health surface: per-queue counts, rate limit buckets, and
    /// the advisory capacity snapshot
    pub async fn health_report(&self) -> QueueHealthReport {
        let health = self.monitor.system_health().await;
        let (queues, _) = self.monitor.collect_queue_health().await;

        QueueHealthReport {
            status: health.status,
            queue_depth: health.queue_depth,
            thresholds: health.thresholds,
            queues,
            rate_limits: self.rate_limiter.statuses(),
            capacity: self.governor.snapshot(),
        }
    }

    /// Bucket status for a single source (lazy-creates the bucket)
    pub fn rate_limit_status(&self, source: &str) -> RateLimitStatus {
        self.rate_limiter.status(source)
    }
}
