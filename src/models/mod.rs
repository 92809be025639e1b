//! # Models Module
//!
//! Persisted data layer. The only durable state this subsystem owns is the
//! failure log; counters and token buckets are runtime state and are allowed
//! to reset with the process.

pub mod failure_record;

pub use failure_record::{FailureRecord, NewFailureRecord};
