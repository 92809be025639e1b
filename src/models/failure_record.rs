//! # Failure Record Model
//!
//! Durable dead-letter entry for a failed crawl job. Maps to the
//! `crawler_failure_records` table (see `migrations/`). History is
//! append-only: duplicate failures for the same job create independent
//! records, and a record never reopens once resolved except for the
//! compensating rollback of a failed retry enqueue.
//!
//! The Open → Resolved transition is a compare-and-swap: the `UPDATE` is
//! guarded by `resolved_at IS NULL`, so exactly one of any number of
//! concurrent resolve/retry attempts wins and the rest observe a conflict
//! through the affected row count.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// A persisted job failure awaiting triage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct FailureRecord {
    pub id: Uuid,
    pub queue_name: String,
    pub job_id: String,
    /// Opaque job data needed to replay the crawl
    pub payload: serde_json::Value,
    pub error_message: String,
    pub created_at: DateTime<Utc>,
    /// Set exactly once when the record leaves the Open state
    pub resolved_at: Option<DateTime<Utc>>,
}

impl FailureRecord {
    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }
}

/// New failure record for creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFailureRecord {
    pub queue_name: String,
    pub job_id: String,
    pub payload: serde_json::Value,
    pub error_message: String,
}

impl FailureRecord {
    /// Insert a new Open record
    pub async fn create(
        pool: &PgPool,
        new_record: NewFailureRecord,
    ) -> Result<FailureRecord, sqlx::Error> {
        sqlx::query_as::<_, FailureRecord>(
            r#"
            INSERT INTO crawler_failure_records
                (id, queue_name, job_id, payload, error_message, created_at, resolved_at)
            VALUES ($1, $2, $3, $4, $5, NOW(), NULL)
            RETURNING id, queue_name, job_id, payload, error_message, created_at, resolved_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new_record.queue_name)
        .bind(new_record.job_id)
        .bind(new_record.payload)
        .bind(new_record.error_message)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: Uuid,
    ) -> Result<Option<FailureRecord>, sqlx::Error> {
        sqlx::query_as::<_, FailureRecord>(
            r#"
            SELECT id, queue_name, job_id, payload, error_message, created_at, resolved_at
            FROM crawler_failure_records
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// All Open records, oldest first
    pub async fn list_open(pool: &PgPool) -> Result<Vec<FailureRecord>, sqlx::Error> {
        sqlx::query_as::<_, FailureRecord>(
            r#"
            SELECT id, queue_name, job_id, payload, error_message, created_at, resolved_at
            FROM crawler_failure_records
            WHERE resolved_at IS NULL
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(pool)
        .await
    }

    /// Paginated listing, newest first
    pub async fn list_paginated(
        pool: &PgPool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<FailureRecord>, sqlx::Error> {
        sqlx::query_as::<_, FailureRecord>(
            r#"
            SELECT id, queue_name, job_id, payload, error_message, created_at, resolved_at
            FROM crawler_failure_records
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    /// CAS transition Open → Resolved. Returns whether this caller won the
    /// transition; `false` means the record was missing or already resolved.
    pub async fn mark_resolved_if_open(
        pool: &PgPool,
        id: Uuid,
        resolved_at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE crawler_failure_records
            SET resolved_at = $2
            WHERE id = $1 AND resolved_at IS NULL
            "#,
        )
        .bind(id)
        .bind(resolved_at)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Compensating rollback for a retry whose re-enqueue failed
    pub async fn reopen(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE crawler_failure_records
            SET resolved_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn delete_by_id(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM crawler_failure_records WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Delete resolved records older than the cutoff. Open records are never
    /// touched regardless of age.
    pub async fn delete_resolved_before(
        pool: &PgPool,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM crawler_failure_records
            WHERE resolved_at IS NOT NULL AND resolved_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Count what `delete_resolved_before` would remove (dry runs)
    pub async fn count_resolved_before(
        pool: &PgPool,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM crawler_failure_records
            WHERE resolved_at IS NOT NULL AND resolved_at < $1
            "#,
        )
        .bind(cutoff)
        .fetch_one(pool)
        .await?;
        Ok(count.max(0) as u64)
    }
}
