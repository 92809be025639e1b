//! # Concurrency Module
//!
//! Shared-capacity enforcement for the crawl worker fleet: the atomic
//! in-flight job governor and the per-source token bucket rate limiter.
//! Both expose non-blocking admission checks that return immediately;
//! callers that want to wait must poll or queue externally.

pub mod governor;
pub mod rate_limiter;

pub use governor::{CapacitySnapshot, ConcurrencyGovernor, JobPermit};
pub use rate_limiter::{RateLimitStatus, RateLimiter};
