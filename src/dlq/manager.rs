//! # Dead Letter Manager
//!
//! Records, classifies, and remediates crawl job failures. Every failure is
//! either Open (visible to operators) or was explicitly Resolved or Deleted
//! by a recorded action; nothing is dropped silently.
//!
//! State machine per record: **Open → Resolved → (Deleted)**. Resolution is
//! terminal: `retry` and `resolve` are the same transition, and a retried
//! job that fails again produces a brand-new record rather than reopening
//! the old one.

use crate::config::DlqConfig;
use crate::constants::FailureClass;
use crate::dlq::classifier::ErrorPatternClassifier;
use crate::dlq::store::FailureStore;
use crate::error::{CrawlerError, Result};
use crate::messaging::{CrawlJobEnvelope, JobTransport};
use crate::models::{FailureRecord, NewFailureRecord};
use chrono::{Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of a retry attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryOutcome {
    /// Record claimed and job re-enqueued on its original queue
    Enqueued,
    /// Record was already resolved, or a concurrent attempt won
    Conflict,
    NotFound,
}

/// Outcome of a manual resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveOutcome {
    Resolved,
    Conflict,
    NotFound,
}

/// One analyze() group: Open failures sharing an error-message prefix
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPatternGroup {
    /// Bounded-length error prefix used as the grouping key
    pub pattern: String,
    pub count: u64,
    pub classification: FailureClass,
}

/// Aggregated view of the Open failure set
#[derive(Debug, Clone, Serialize)]
pub struct FailureAnalysis {
    pub total: u64,
    pub by_queue: BTreeMap<String, u64>,
    /// Groups sorted by descending count
    pub by_error_pattern: Vec<ErrorPatternGroup>,
    pub transient_count: u64,
    pub permanent_count: u64,
    pub unknown_count: u64,
    pub oldest_unresolved: Option<chrono::DateTime<chrono::Utc>>,
}

/// Failure log manager: record, triage, remediate
pub struct DeadLetterManager {
    store: Arc<dyn FailureStore>,
    transport: Arc<dyn JobTransport>,
    classifier: ErrorPatternClassifier,
    config: DlqConfig,
}

impl DeadLetterManager {
    pub fn new(
        config: DlqConfig,
        store: Arc<dyn FailureStore>,
        transport: Arc<dyn JobTransport>,
    ) -> Result<Self> {
        let classifier = ErrorPatternClassifier::from_rules(&config.classification)?;
        Ok(Self {
            store,
            transport,
            classifier,
            config,
        })
    }

    /// Record a job failure as a new Open record. Append-only: repeated
    /// failures of the same job each get their own record.
    ///
    /// The payload must be the original [`CrawlJobEnvelope`] JSON as it was
    /// enqueued; `retry` replays it verbatim (with a fresh job id) and will
    /// refuse to resolve a record whose payload does not deserialize as one.
    pub async fn record(
        &self,
        queue_name: &str,
        job_id: &str,
        payload: serde_json::Value,
        error_message: &str,
    ) -> Result<FailureRecord> {
        let classification = self.classifier.classify(error_message);
        let record = self
            .store
            .insert(NewFailureRecord {
                queue_name: queue_name.to_string(),
                job_id: job_id.to_string(),
                payload,
                error_message: error_message.to_string(),
            })
            .await?;

        match classification {
            FailureClass::Permanent => warn!(
                queue_name,
                job_id,
                failure_id = %record.id,
                "Permanent job failure recorded"
            ),
            _ => info!(
                queue_name,
                job_id,
                failure_id = %record.id,
                %classification,
                "Job failure recorded"
            ),
        }
        Ok(record)
    }

    /// Classify an error message without touching any record
    pub fn classify(&self, error_message: &str) -> FailureClass {
        self.classifier.classify(error_message)
    }

    /// Group and classify the Open failure set
    pub async fn analyze(&self) -> Result<FailureAnalysis> {
        let open = self.store.list_open().await?;

        let mut by_queue: BTreeMap<String, u64> = BTreeMap::new();
        // prefix -> (count, representative full message)
        let mut groups: BTreeMap<String, (u64, String)> = BTreeMap::new();
        let mut oldest_unresolved = None;

        for record in &open {
            *by_queue.entry(record.queue_name.clone()).or_default() += 1;

            let prefix: String = record
                .error_message
                .chars()
                .take(self.config.error_group_prefix_len)
                .collect();
            let entry = groups
                .entry(prefix)
                .or_insert_with(|| (0, record.error_message.clone()));
            entry.0 += 1;

            if oldest_unresolved.is_none() {
                // list_open is oldest-first
                oldest_unresolved = Some(record.created_at);
            }
        }

        let mut transient_count = 0;
        let mut permanent_count = 0;
        let mut unknown_count = 0;
        let mut by_error_pattern: Vec<ErrorPatternGroup> = groups
            .into_iter()
            .map(|(pattern, (count, representative))| {
                // One classification per group
                let classification = self.classifier.classify(&representative);
                match classification {
                    FailureClass::Transient => transient_count += count,
                    FailureClass::Permanent => permanent_count += count,
                    FailureClass::Unknown => unknown_count += count,
                }
                ErrorPatternGroup {
                    pattern,
                    count,
                    classification,
                }
            })
            .collect();
        by_error_pattern.sort_by(|a, b| b.count.cmp(&a.count));

        Ok(FailureAnalysis {
            total: open.len() as u64,
            by_queue,
            by_error_pattern,
            transient_count,
            permanent_count,
            unknown_count,
            oldest_unresolved,
        })
    }

    /// Resolve every Open record classified transient. Permanent and
    /// unknown records are never touched. Returns the affected (or, in dry
    /// run, would-be-affected) count.
    pub async fn auto_resolve_transient(&self, dry_run: bool) -> Result<u64> {
        let open = self.store.list_open().await?;
        let mut resolved = 0u64;

        for record in open {
            if self.classifier.classify(&record.error_message) != FailureClass::Transient {
                continue;
            }
            if dry_run {
                resolved += 1;
            } else if self
                .store
                .mark_resolved_if_open(record.id, Utc::now())
                .await?
            {
                resolved += 1;
            }
        }

        info!(resolved, dry_run, "Auto-resolved transient failures");
        Ok(resolved)
    }

    /// Re-enqueue an Open failure on its original queue and resolve it.
    ///
    /// The record is claimed first (CAS Open → Resolved) so concurrent
    /// retries have exactly one winner; if the re-enqueue then fails, the
    /// claim is rolled back and the record stays Open for a later attempt.
    pub async fn retry(&self, failure_id: Uuid) -> Result<RetryOutcome> {
        let Some(record) = self.store.find(failure_id).await? else {
            return Ok(RetryOutcome::NotFound);
        };
        if !record.is_open() {
            return Ok(RetryOutcome::Conflict);
        }

        if !self
            .store
            .mark_resolved_if_open(failure_id, Utc::now())
            .await?
        {
            return Ok(RetryOutcome::Conflict);
        }

        let envelope = match self.replay_envelope(&record) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.store.reopen(failure_id).await?;
                return Err(e);
            }
        };

        if let Err(e) = self.transport.enqueue(&record.queue_name, &envelope).await {
            warn!(
                failure_id = %failure_id,
                queue_name = %record.queue_name,
                error = %e,
                "Retry enqueue failed; record left Open"
            );
            self.store.reopen(failure_id).await?;
            return Err(e);
        }

        info!(
            failure_id = %failure_id,
            queue_name = %record.queue_name,
            retry_job_id = %envelope.job_id,
            "Failure retried and resolved"
        );
        Ok(RetryOutcome::Enqueued)
    }

    /// Rebuild the job envelope for replay, with an idempotent retry key so
    /// transport-level dedup never collapses distinct attempts
    fn replay_envelope(&self, record: &FailureRecord) -> Result<CrawlJobEnvelope> {
        let mut envelope: CrawlJobEnvelope = serde_json::from_value(record.payload.clone())
            .map_err(|e| CrawlerError::Serialization {
                message: format!(
                    "failure record {} payload is not a replayable job envelope: {e}",
                    record.id
                ),
            })?;
        envelope.job_id = format!("{}-retry-{}", record.job_id, Utc::now().timestamp_millis());
        envelope.enqueued_at = Utc::now();
        Ok(envelope)
    }

    /// Mark an Open record resolved without re-enqueueing
    pub async fn resolve(&self, failure_id: Uuid) -> Result<ResolveOutcome> {
        if self.store.find(failure_id).await?.is_none() {
            return Ok(ResolveOutcome::NotFound);
        }
        if self
            .store
            .mark_resolved_if_open(failure_id, Utc::now())
            .await?
        {
            info!(failure_id = %failure_id, "Failure resolved manually");
            Ok(ResolveOutcome::Resolved)
        } else {
            Ok(ResolveOutcome::Conflict)
        }
    }

    /// Delete a record outright, whatever its state
    pub async fn delete(&self, failure_id: Uuid) -> Result<bool> {
        let deleted = self.store.delete(failure_id).await?;
        if deleted {
            info!(failure_id = %failure_id, "Failure record deleted");
        }
        Ok(deleted)
    }

    /// Delete resolved records older than the retention window. Open
    /// records are never pruned regardless of age.
    pub async fn prune_old_resolved(&self, retention_days: i64, dry_run: bool) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(retention_days);
        let deleted = if dry_run {
            self.store.count_resolved_before(cutoff).await?
        } else {
            self.store.delete_resolved_before(cutoff).await?
        };

        info!(deleted, retention_days, dry_run, "Pruned resolved failures");
        Ok(deleted)
    }

    /// Prune using the configured retention window
    pub async fn prune(&self, dry_run: bool) -> Result<u64> {
        self.prune_old_resolved(self.config.retention_days, dry_run)
            .await
    }

    /// Paginated failure listing for the admin surface. The limit is capped
    /// by configuration.
    pub async fn list(&self, limit: Option<i64>, offset: i64) -> Result<Vec<FailureRecord>> {
        let limit = limit
            .unwrap_or(self.config.max_page_size)
            .clamp(1, self.config.max_page_size);
        debug!(limit, offset, "Listing failure records");
        self.store.list(limit, offset.max(0)).await
    }
}
