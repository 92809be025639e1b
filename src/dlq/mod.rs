//! # Dead Letter Module
//!
//! Durable failure log for crawl jobs that exhausted their retries. Failures
//! are recorded append-only, classified against configurable error patterns,
//! and remediated through explicit operator actions (retry, resolve, delete)
//! or the bulk auto-resolve and prune sweeps. Storage goes through the
//! [`FailureStore`] seam so the manager logic is testable without Postgres.

pub mod admin;
pub mod classifier;
pub mod manager;
pub mod store;

pub use admin::{handle_failure_action, handle_list, handle_prune, AdminOutcome, FailureListing};
pub use classifier::ErrorPatternClassifier;
pub use manager::{
    DeadLetterManager, ErrorPatternGroup, FailureAnalysis, ResolveOutcome, RetryOutcome,
};
pub use store::{FailureStore, InMemoryFailureStore, PgFailureStore};
