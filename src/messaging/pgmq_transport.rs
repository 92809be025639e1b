//! # PostgreSQL Message Queue Transport
//!
//! `JobTransport` implementation backed by the pgmq-rs crate. Enqueue and
//! drain go through the pgmq client; job counts are read with direct SQL
//! against the pgmq queue and archive tables, classifying rows by visibility
//! timeout the same way the queue worker does.

use crate::error::{CrawlerError, Result};
use crate::messaging::transport::{CrawlJobEnvelope, JobCounts, JobTransport};
use async_trait::async_trait;
use pgmq::PGMQueue;
use sqlx::{PgPool, Row};
use tracing::{debug, info, warn};

/// pgmq-backed job transport
#[derive(Clone)]
pub struct PgmqTransport {
    pgmq: PGMQueue,
    pool: PgPool,
}

impl PgmqTransport {
    /// Connect using a database URL
    pub async fn new(database_url: &str) -> Result<Self> {
        info!("Connecting crawl job transport to pgmq");

        let pgmq = PGMQueue::new(database_url.to_string())
            .await
            .map_err(|e| CrawlerError::transport("*", "connect", e))?;
        let pool = pgmq.connection.clone();

        Ok(Self { pgmq, pool })
    }

    /// Build from an existing connection pool (shared with the rest of the
    /// application)
    pub async fn new_with_pool(pool: PgPool) -> Self {
        let pgmq = PGMQueue::new_with_pool(pool.clone()).await;
        Self { pgmq, pool }
    }

    /// Create the named queue if it does not exist yet
    pub async fn ensure_queue(&self, queue_name: &str) -> Result<()> {
        debug!(queue_name, "Ensuring queue exists");
        self.pgmq
            .create(queue_name)
            .await
            .map_err(|e| CrawlerError::transport(queue_name, "create", e))?;
        Ok(())
    }
}

#[async_trait]
impl JobTransport for PgmqTransport {
    async fn enqueue(&self, queue_name: &str, envelope: &CrawlJobEnvelope) -> Result<i64> {
        let message_id = self
            .pgmq
            .send(queue_name, envelope)
            .await
            .map_err(|e| CrawlerError::transport(queue_name, "enqueue", e))?;

        debug!(
            queue_name,
            job_id = %envelope.job_id,
            message_id,
            "Crawl job enqueued"
        );
        Ok(message_id)
    }

    async fn job_counts(&self, queue_name: &str) -> Result<JobCounts> {
        // Queue rows: visible rows are waiting; invisible rows are either
        // being worked (read at least once) or deliberately delayed.
        // The name lands inside a quoted identifier; config validation
        // restricts queue names to an identifier-safe charset.
        let queue_sql = format!(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE vt <= clock_timestamp()) AS waiting,
                COUNT(*) FILTER (WHERE vt > clock_timestamp() AND read_ct > 0) AS active,
                COUNT(*) FILTER (WHERE vt > clock_timestamp() AND read_ct = 0) AS delayed
            FROM pgmq."q_{queue_name}"
            "#
        );

        let row = sqlx::query(&queue_sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CrawlerError::transport(queue_name, "job_counts", e))?;

        let waiting: i64 = row.try_get("waiting").unwrap_or(0);
        let active: i64 = row.try_get("active").unwrap_or(0);
        let delayed: i64 = row.try_get("delayed").unwrap_or(0);

        // Archived rows are jobs the workers finished with; failures are
        // accounted for by the dead-letter log, not the transport.
        let archive_sql = format!(r#"SELECT COUNT(*) AS completed FROM pgmq."a_{queue_name}""#);
        let completed: i64 = match sqlx::query(&archive_sql).fetch_one(&self.pool).await {
            Ok(row) => row.try_get("completed").unwrap_or(0),
            Err(e) => {
                debug!(queue_name, error = %e, "No archive table for queue");
                0
            }
        };

        Ok(JobCounts {
            waiting: waiting.max(0) as u64,
            active: active.max(0) as u64,
            delayed: delayed.max(0) as u64,
            failed: 0,
            completed: completed.max(0) as u64,
        })
    }

    async fn drain(&self, queue_name: &str) -> Result<u64> {
        warn!(queue_name, "Draining queue");

        let purged = self
            .pgmq
            .purge(queue_name)
            .await
            .map_err(|e| CrawlerError::transport(queue_name, "drain", e))?;

        warn!(queue_name, purged, "Queue drained");
        Ok(purged)
    }
}

impl std::fmt::Debug for PgmqTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgmqTransport").finish_non_exhaustive()
    }
}
