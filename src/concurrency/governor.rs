//! # Worker Concurrency Governor
//!
//! Tracks in-flight crawl jobs at three granularities (global, per-queue,
//! per-source) and answers admission queries atomically. The check and the
//! increment are a single critical section: a separate "can start" predicate
//! followed by a separate "record start" call would let N racing callers all
//! pass a check meant to admit one, so no standalone binding predicate is
//! exposed. `snapshot()` exists for monitoring display only and is
//! explicitly advisory.
//!
//! Internally the governor stores one admission record per in-flight job and
//! derives every counter from the live records. That makes the invariants
//! structural: counters cannot go negative, and the global count is always
//! the sum of the per-queue counts.
//!
//! A job that starts and never finishes would otherwise leak capacity
//! forever; admissions therefore carry an optional TTL lease, and an
//! administrative `reap_expired()` sweep releases capacity held past its
//! deadline. See `JobPermit` for the scoped acquire/always-release pattern
//! workers should use.

use crate::config::{GovernorConfig, QueuePolicy};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One in-flight admission
#[derive(Debug, Clone)]
struct AdmissionRecord {
    queue_name: String,
    source_name: Option<String>,
    expires_at: Option<Instant>,
}

/// Advisory, non-binding view of current capacity usage.
///
/// Never use this to decide admission; call [`ConcurrencyGovernor::try_start`]
/// instead, which checks and claims capacity in one atomic step.
#[derive(Debug, Clone, Serialize)]
pub struct CapacitySnapshot {
    pub global_in_flight: u32,
    pub global_max: u32,
    pub per_queue_in_flight: HashMap<String, u32>,
    pub per_source_in_flight: HashMap<String, u32>,
}

/// Atomic admission control over in-flight crawl jobs
#[derive(Debug)]
pub struct ConcurrencyGovernor {
    global_max: u32,
    policies: HashMap<String, QueuePolicy>,
    lease_ttl: Option<Duration>,
    records: Mutex<Vec<AdmissionRecord>>,
}

impl ConcurrencyGovernor {
    pub fn new(config: &GovernorConfig) -> Self {
        let policies = config
            .queues
            .iter()
            .map(|p| (p.queue_name.clone(), p.clone()))
            .collect();

        info!(
            global_max = config.global_max_concurrent,
            queue_count = config.queues.len(),
            lease_ttl_seconds = ?config.lease_ttl_seconds,
            "Concurrency governor initialized"
        );

        Self {
            global_max: config.global_max_concurrent,
            policies,
            lease_ttl: config.lease_ttl(),
            records: Mutex::new(Vec::new()),
        }
    }

    /// Atomically check capacity and claim it. Returns `true` and increments
    /// all applicable counters as one unit, or returns `false` and changes
    /// nothing. Never admits partially.
    pub fn try_start(&self, queue_name: &str, source_name: Option<&str>) -> bool {
        let Some(policy) = self.policies.get(queue_name) else {
            warn!(queue_name, "Admission denied: no policy for queue");
            return false;
        };

        let mut records = self.records.lock();

        if records.len() as u32 >= self.global_max {
            debug!(queue_name, global_max = self.global_max, "Admission denied: global cap");
            return false;
        }

        let per_queue = records
            .iter()
            .filter(|r| r.queue_name == queue_name)
            .count() as u32;
        if per_queue >= policy.max_concurrent_per_queue {
            debug!(
                queue_name,
                cap = policy.max_concurrent_per_queue,
                "Admission denied: per-queue cap"
            );
            return false;
        }

        if let (Some(source), Some(cap)) = (source_name, policy.max_concurrent_per_source) {
            let per_source = records
                .iter()
                .filter(|r| {
                    r.queue_name == queue_name && r.source_name.as_deref() == Some(source)
                })
                .count() as u32;
            if per_source >= cap {
                debug!(queue_name, source, cap, "Admission denied: per-source cap");
                return false;
            }
        }

        records.push(AdmissionRecord {
            queue_name: queue_name.to_string(),
            source_name: source_name.map(str::to_string),
            expires_at: self.lease_ttl.map(|ttl| Instant::now() + ttl),
        });

        debug!(
            queue_name,
            source = ?source_name,
            global_in_flight = records.len(),
            "Job admitted"
        );
        true
    }

    /// Release capacity claimed by a matching `try_start`. Releasing more
    /// times than was acquired is a no-op rather than an error, which floors
    /// every counter at zero and protects against double-release bugs.
    pub fn finish(&self, queue_name: &str, source_name: Option<&str>) {
        let mut records = self.records.lock();
        let position = records.iter().position(|r| {
            r.queue_name == queue_name && r.source_name.as_deref() == source_name
        });

        match position {
            Some(index) => {
                records.swap_remove(index);
                debug!(
                    queue_name,
                    source = ?source_name,
                    global_in_flight = records.len(),
                    "Job finished"
                );
            }
            None => {
                debug!(queue_name, source = ?source_name, "Finish with no matching admission");
            }
        }
    }

    /// Acquire capacity wrapped in a guard that always releases on drop,
    /// including unwind paths. Preferred over raw `try_start`/`finish`
    /// pairing in worker code.
    pub fn acquire(
        self: &Arc<Self>,
        queue_name: &str,
        source_name: Option<&str>,
    ) -> Option<JobPermit> {
        if self.try_start(queue_name, source_name) {
            Some(JobPermit {
                governor: Arc::clone(self),
                queue_name: queue_name.to_string(),
                source_name: source_name.map(str::to_string),
                released: false,
            })
        } else {
            None
        }
    }

    /// Release every admission whose lease deadline has passed. Returns how
    /// many were reaped. No-op when leasing is disabled.
    pub fn reap_expired(&self) -> usize {
        let now = Instant::now();
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|r| r.expires_at.map_or(true, |deadline| deadline > now));
        let reaped = before - records.len();

        if reaped > 0 {
            warn!(reaped, "Reaped expired capacity leases");
        }
        reaped
    }

    /// Zero every counter. Administrative and test use only.
    pub fn reset(&self) {
        let mut records = self.records.lock();
        let dropped = records.len();
        records.clear();
        if dropped > 0 {
            warn!(dropped, "Concurrency counters reset");
        }
    }

    /// Advisory usage snapshot for monitoring display. Non-binding: by the
    /// time a caller acts on it the numbers may have changed.
    pub fn snapshot(&self) -> CapacitySnapshot {
        let records = self.records.lock();

        let mut per_queue: HashMap<String, u32> = HashMap::new();
        let mut per_source: HashMap<String, u32> = HashMap::new();
        for record in records.iter() {
            *per_queue.entry(record.queue_name.clone()).or_default() += 1;
            if let Some(source) = &record.source_name {
                let key = format!("{}/{}", record.queue_name, source);
                *per_source.entry(key).or_default() += 1;
            }
        }

        CapacitySnapshot {
            global_in_flight: records.len() as u32,
            global_max: self.global_max,
            per_queue_in_flight: per_queue,
            per_source_in_flight: per_source,
        }
    }
}

/// Scoped capacity claim. Dropping the permit releases the claim, so worker
/// code cannot leak capacity on early return or panic.
#[derive(Debug)]
pub struct JobPermit {
    governor: Arc<ConcurrencyGovernor>,
    queue_name: String,
    source_name: Option<String>,
    released: bool,
}

impl JobPermit {
    /// Release the claim explicitly. Equivalent to dropping the permit.
    pub fn complete(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.governor
                .finish(&self.queue_name, self.source_name.as_deref());
        }
    }
}

impl Drop for JobPermit {
    fn drop(&mut self) {
        self.release();
    }
}
