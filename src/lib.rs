#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Crawler Core Rust
//!
//! Admission control and worker concurrency governance for a catalog crawl
//! pipeline backed by PostgreSQL queues.
//!
//! ## Overview
//!
//! The crate sits between job producers (schedulers, user requests, backfill
//! tooling) and the crawl worker fleet. It decides which jobs may enter the
//! queues, how many may run at once, and what happens to the ones that fail
//! permanently.
//!
//! ## Module Organization
//!
//! - [`gatekeeper`] - Admission pipeline: health gate, tier gate, rate limit, enqueue
//! - [`concurrency`] - In-flight job governor and per-source token bucket rate limiter
//! - [`health`] - Tri-state system health derived from aggregate queue depth
//! - [`dlq`] - Dead-letter log: record, classify, retry, resolve, prune
//! - [`messaging`] - Job transport seam with pgmq and in-memory backends
//! - [`models`] - SQLx data layer for durable failure records
//! - [`config`] - YAML configuration with environment overrides
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured console and file logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use crawler_core::concurrency::ConcurrencyGovernor;
//! use crawler_core::config::GovernorConfig;
//! use crawler_core::gatekeeper::{CrawlGatekeeper, CrawlRequest};
//! use crawler_core::messaging::InMemoryTransport;
//! use crawler_core::constants::{CatalogTier, CrawlReason};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GovernorConfig::from_yaml_file(std::path::Path::new("config/governor.yaml"))?;
//! let transport = Arc::new(InMemoryTransport::new());
//! let governor = Arc::new(ConcurrencyGovernor::new(&config));
//! let gatekeeper = CrawlGatekeeper::new(config, transport, governor);
//!
//! let decision = gatekeeper
//!     .enqueue_if_allowed(CrawlRequest {
//!         queue_name: "crawl-metadata".to_string(),
//!         source_id: "mangadex".to_string(),
//!         catalog_tier: CatalogTier::B,
//!         reason: CrawlReason::Scheduled,
//!         job_id: "series-42".to_string(),
//!         payload: serde_json::json!({"series_id": 42}),
//!     })
//!     .await?;
//!
//! println!("admitted: {}", decision.admitted);
//! # Ok(())
//! # }
//! ```

pub mod concurrency;
pub mod config;
pub mod constants;
pub mod dlq;
pub mod error;
pub mod gatekeeper;
pub mod health;
pub mod logging;
pub mod messaging;
pub mod models;

pub use concurrency::{CapacitySnapshot, ConcurrencyGovernor, JobPermit, RateLimiter};
pub use config::GovernorConfig;
pub use constants::{CatalogTier, CrawlReason, FailureClass, HealthStatus};
pub use dlq::{DeadLetterManager, FailureAnalysis, RetryOutcome};
pub use error::{CrawlerError, Result};
pub use gatekeeper::{AdmissionDecision, AdmissionStatus, CrawlGatekeeper, CrawlRequest};
pub use health::{SystemHealth, SystemHealthMonitor};
pub use messaging::{CrawlJobEnvelope, InMemoryTransport, JobTransport, PgmqTransport};
