//! # Failure Store Seam
//!
//! Storage contract for the dead-letter log. `PgFailureStore` is the
//! production backend; `InMemoryFailureStore` backs tests and local runs.
//! Both must provide the same compare-and-swap semantics for the
//! Open → Resolved transition so concurrent retry/resolve attempts have
//! exactly one winner.

use crate::error::{CrawlerError, Result};
use crate::models::{FailureRecord, NewFailureRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sqlx::PgPool;
use uuid::Uuid;

/// Keyed storage for failure records
#[async_trait]
pub trait FailureStore: Send + Sync {
    async fn insert(&self, new_record: NewFailureRecord) -> Result<FailureRecord>;

    async fn find(&self, id: Uuid) -> Result<Option<FailureRecord>>;

    /// All Open records, oldest first
    async fn list_open(&self) -> Result<Vec<FailureRecord>>;

    /// Paginated listing, newest first
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<FailureRecord>>;

    /// CAS Open → Resolved; `true` only for the single winning caller
    async fn mark_resolved_if_open(&self, id: Uuid, resolved_at: DateTime<Utc>) -> Result<bool>;

    /// Rollback of a claimed resolution (failed retry enqueue)
    async fn reopen(&self, id: Uuid) -> Result<()>;

    async fn delete(&self, id: Uuid) -> Result<bool>;

    async fn delete_resolved_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    async fn count_resolved_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// PostgreSQL-backed failure store
#[derive(Debug, Clone)]
pub struct PgFailureStore {
    pool: PgPool,
}

impl PgFailureStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FailureStore for PgFailureStore {
    async fn insert(&self, new_record: NewFailureRecord) -> Result<FailureRecord> {
        FailureRecord::create(&self.pool, new_record)
            .await
            .map_err(|e| CrawlerError::database("insert_failure_record", e))
    }

    async fn find(&self, id: Uuid) -> Result<Option<FailureRecord>> {
        FailureRecord::find_by_id(&self.pool, id)
            .await
            .map_err(|e| CrawlerError::database("find_failure_record", e))
    }

    async fn list_open(&self) -> Result<Vec<FailureRecord>> {
        FailureRecord::list_open(&self.pool)
            .await
            .map_err(|e| CrawlerError::database("list_open_failures", e))
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<FailureRecord>> {
        FailureRecord::list_paginated(&self.pool, limit, offset)
            .await
            .map_err(|e| CrawlerError::database("list_failures", e))
    }

    async fn mark_resolved_if_open(&self, id: Uuid, resolved_at: DateTime<Utc>) -> Result<bool> {
        FailureRecord::mark_resolved_if_open(&self.pool, id, resolved_at)
            .await
            .map_err(|e| CrawlerError::database("resolve_failure", e))
    }

    async fn reopen(&self, id: Uuid) -> Result<()> {
        FailureRecord::reopen(&self.pool, id)
            .await
            .map_err(|e| CrawlerError::database("reopen_failure", e))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        FailureRecord::delete_by_id(&self.pool, id)
            .await
            .map_err(|e| CrawlerError::database("delete_failure", e))
    }

    async fn delete_resolved_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        FailureRecord::delete_resolved_before(&self.pool, cutoff)
            .await
            .map_err(|e| CrawlerError::database("prune_failures", e))
    }

    async fn count_resolved_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        FailureRecord::count_resolved_before(&self.pool, cutoff)
            .await
            .map_err(|e| CrawlerError::database("count_prunable_failures", e))
    }
}

/// Mutex-guarded in-memory failure store
#[derive(Debug, Default)]
pub struct InMemoryFailureStore {
    records: Mutex<Vec<FailureRecord>>,
}

impl InMemoryFailureStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FailureStore for InMemoryFailureStore {
    async fn insert(&self, new_record: NewFailureRecord) -> Result<FailureRecord> {
        let record = FailureRecord {
            id: Uuid::new_v4(),
            queue_name: new_record.queue_name,
            job_id: new_record.job_id,
            payload: new_record.payload,
            error_message: new_record.error_message,
            created_at: Utc::now(),
            resolved_at: None,
        };
        self.records.lock().push(record.clone());
        Ok(record)
    }

    async fn find(&self, id: Uuid) -> Result<Option<FailureRecord>> {
        Ok(self.records.lock().iter().find(|r| r.id == id).cloned())
    }

    async fn list_open(&self) -> Result<Vec<FailureRecord>> {
        let mut open: Vec<FailureRecord> = self
            .records
            .lock()
            .iter()
            .filter(|r| r.is_open())
            .cloned()
            .collect();
        open.sort_by_key(|r| r.created_at);
        Ok(open)
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<FailureRecord>> {
        let mut all: Vec<FailureRecord> = self.records.lock().clone();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn mark_resolved_if_open(&self, id: Uuid, resolved_at: DateTime<Utc>) -> Result<bool> {
        let mut records = self.records.lock();
        match records.iter_mut().find(|r| r.id == id && r.is_open()) {
            Some(record) => {
                record.resolved_at = Some(resolved_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn reopen(&self, id: Uuid) -> Result<()> {
        let mut records = self.records.lock();
        if let Some(record) = records.iter_mut().find(|r| r.id == id) {
            record.resolved_at = None;
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|r| r.id != id);
        Ok(records.len() < before)
    }

    async fn delete_resolved_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|r| match r.resolved_at {
            Some(resolved_at) => resolved_at >= cutoff,
            None => true,
        });
        Ok((before - records.len()) as u64)
    }

    async fn count_resolved_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        Ok(self
            .records
            .lock()
            .iter()
            .filter(|r| matches!(r.resolved_at, Some(resolved_at) if resolved_at < cutoff))
            .count() as u64)
    }
}
