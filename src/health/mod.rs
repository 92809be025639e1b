//! # System Health Module
//!
//! Derives the tri-state system health classification from aggregate queue
//! depth. Health is recomputed on every query from live transport counts;
//! nothing is persisted and nothing is mutated. Callers may poll at high
//! frequency, but should still rate-limit themselves to avoid hammering the
//! transport's count API.

pub mod monitor;

pub use monitor::{QueueHealth, SystemHealth, SystemHealthMonitor};
