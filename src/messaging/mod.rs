//! # Messaging Module
//!
//! Queue transport seam for crawl jobs. The governor treats the transport as
//! an opaque FIFO/priority queue: enqueue an envelope, read per-queue job
//! counts, drain a queue. `PgmqTransport` backs production deployments with
//! PostgreSQL message queues; `InMemoryTransport` backs tests and
//! single-process development runs.
//!
//! ## Usage
//!
//! ```rust
//! use crawler_core::constants::{CatalogTier, CrawlReason};
//! use crawler_core::messaging::{CrawlJobEnvelope, InMemoryTransport, JobTransport};
//!
//! # tokio_test::block_on(async {
//! let transport = InMemoryTransport::new();
//! let envelope = CrawlJobEnvelope {
//!     job_id: "series-42".to_string(),
//!     source_id: "mangadex".to_string(),
//!     catalog_tier: CatalogTier::B,
//!     reason: CrawlReason::Scheduled,
//!     priority: 0,
//!     payload: serde_json::json!({"series_id": 42}),
//!     enqueued_at: chrono::Utc::now(),
//! };
//!
//! transport.enqueue("crawl-metadata", &envelope).await.unwrap();
//! let counts = transport.job_counts("crawl-metadata").await.unwrap();
//! assert_eq!(counts.waiting, 1);
//! # });
//! ```

pub mod memory;
pub mod pgmq_transport;
pub mod transport;

pub use memory::InMemoryTransport;
pub use pgmq_transport::PgmqTransport;
pub use transport::{CrawlJobEnvelope, JobCounts, JobTransport};
