//! # Per-Source Rate Limiter
//!
//! One token bucket per content source, created lazily at full capacity on
//! first reference and refilled continuously based on elapsed time. Buckets
//! are fully independent: a slow or misbehaving source cannot starve tokens
//! for others. Each consume is a single shard-locked mutation, so racing
//! callers can never double-spend the same tokens.

use crate::config::RateLimitConfig;
use dashmap::DashMap;
use serde::Serialize;
use std::time::Instant;
use tracing::debug;

/// Mutable bucket state for one source
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    max_tokens: f64,
    refill_per_second: f64,
    last_refill_at: Instant,
}

impl TokenBucket {
    fn new(max_tokens: f64, refill_per_second: f64) -> Self {
        Self {
            tokens: max_tokens,
            max_tokens,
            refill_per_second,
            last_refill_at: Instant::now(),
        }
    }

    /// Credit tokens for elapsed time, clamped to capacity
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill_at).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_second).min(self.max_tokens);
        self.last_refill_at = now;
    }
}

/// Point-in-time bucket status for a source
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStatus {
    pub source: String,
    pub tokens: f64,
    pub max_tokens: f64,
    pub requests_per_second: f64,
}

/// Lazy per-source token bucket rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: DashMap<String, TokenBucket>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
        }
    }

    /// Refill and attempt to spend `cost` tokens for a source. Returns
    /// whether the spend succeeded; a failed attempt consumes nothing.
    pub fn try_consume(&self, source: &str, cost: f64) -> bool {
        let limit = self.config.limit_for(source);
        let mut bucket = self
            .buckets
            .entry(source.to_string())
            .or_insert_with(|| TokenBucket::new(limit.max_tokens, limit.refill_per_second));

        bucket.refill();
        if bucket.tokens >= cost {
            bucket.tokens -= cost;
            true
        } else {
            debug!(
                source,
                tokens = bucket.tokens,
                cost,
                "Rate limit exhausted for source"
            );
            false
        }
    }

    /// Refill and report the current bucket state for a source, creating the
    /// bucket at full capacity if this is the first reference
    pub fn status(&self, source: &str) -> RateLimitStatus {
        let limit = self.config.limit_for(source);
        let mut bucket = self
            .buckets
            .entry(source.to_string())
            .or_insert_with(|| TokenBucket::new(limit.max_tokens, limit.refill_per_second));

        bucket.refill();
        RateLimitStatus {
            source: source.to_string(),
            tokens: bucket.tokens,
            max_tokens: bucket.max_tokens,
            requests_per_second: bucket.refill_per_second,
        }
    }

    /// Statuses for every source seen so far, for the health report
    pub fn statuses(&self) -> Vec<RateLimitStatus> {
        let mut statuses: Vec<RateLimitStatus> = self
            .buckets
            .iter_mut()
            .map(|mut entry| {
                entry.refill();
                RateLimitStatus {
                    source: entry.key().clone(),
                    tokens: entry.tokens,
                    max_tokens: entry.max_tokens,
                    requests_per_second: entry.refill_per_second,
                }
            })
            .collect();
        statuses.sort_by(|a, b| a.source.cmp(&b.source));
        statuses
    }
}
