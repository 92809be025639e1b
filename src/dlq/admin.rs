//! # Failure Admin Actions
//!
//! String-addressed dispatch over the failure remediation operations, for
//! admin surfaces (HTTP handlers, CLI) that receive the action name and
//! record id as untyped text. Maps every outcome to a stable, transport
//! friendly result so callers can translate directly to a status code.

use crate::dlq::manager::{DeadLetterManager, FailureAnalysis, ResolveOutcome, RetryOutcome};
use crate::error::Result;
use crate::models::FailureRecord;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

/// Result of an admin action, independent of transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AdminOutcome {
    /// Action applied; `detail` names what happened (resolved, deleted,
    /// enqueued, pruned count)
    Success { detail: String },
    /// Record exists but is not in a state the action accepts
    Conflict { detail: String },
    NotFound,
    /// Malformed action name or record id
    BadRequest { detail: String },
}

impl AdminOutcome {
    /// Conventional HTTP status for this outcome
    pub fn http_status(&self) -> u16 {
        match self {
            AdminOutcome::Success { .. } => 200,
            AdminOutcome::Conflict { .. } => 409,
            AdminOutcome::NotFound => 404,
            AdminOutcome::BadRequest { .. } => 400,
        }
    }
}

/// Apply a named admin action to a failure record.
///
/// Recognized actions: `resolve`, `delete`, `retry`. The `prune` action is
/// collection-level and takes no record id; see [`handle_prune`].
pub async fn handle_failure_action(
    manager: &DeadLetterManager,
    action: &str,
    failure_id: &str,
) -> Result<AdminOutcome> {
    let id = match Uuid::parse_str(failure_id) {
        Ok(id) => id,
        Err(_) => {
            warn!(failure_id, "Rejected admin action with malformed record id");
            return Ok(AdminOutcome::BadRequest {
                detail: format!("'{failure_id}' is not a valid record id"),
            });
        }
    };

    match action {
        "resolve" => Ok(match manager.resolve(id).await? {
            ResolveOutcome::Resolved => AdminOutcome::Success {
                detail: "resolved".to_string(),
            },
            ResolveOutcome::Conflict => AdminOutcome::Conflict {
                detail: "record is already resolved".to_string(),
            },
            ResolveOutcome::NotFound => AdminOutcome::NotFound,
        }),
        "delete" => Ok(if manager.delete(id).await? {
            AdminOutcome::Success {
                detail: "deleted".to_string(),
            }
        } else {
            AdminOutcome::NotFound
        }),
        "retry" => Ok(match manager.retry(id).await? {
            RetryOutcome::Enqueued => AdminOutcome::Success {
                detail: "enqueued".to_string(),
            },
            RetryOutcome::Conflict => AdminOutcome::Conflict {
                detail: "record is already resolved".to_string(),
            },
            RetryOutcome::NotFound => AdminOutcome::NotFound,
        }),
        other => {
            warn!(action = other, "Rejected unknown admin action");
            Ok(AdminOutcome::BadRequest {
                detail: format!("unknown action '{other}'"),
            })
        }
    }
}

/// Read-mode result for the failure listing endpoint
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum FailureListing {
    /// Grouped analyze() output (`summary=true`)
    Summary(FailureAnalysis),
    /// Paginated records, newest first
    Page(Vec<FailureRecord>),
}

/// Read the failure log either as a grouped summary or as a paginated list
pub async fn handle_list(
    manager: &DeadLetterManager,
    summary: bool,
    limit: Option<i64>,
    offset: i64,
) -> Result<FailureListing> {
    if summary {
        Ok(FailureListing::Summary(manager.analyze().await?))
    } else {
        Ok(FailureListing::Page(manager.list(limit, offset).await?))
    }
}

/// Collection-level prune of old resolved records
pub async fn handle_prune(manager: &DeadLetterManager, dry_run: bool) -> Result<AdminOutcome> {
    let pruned = manager.prune(dry_run).await?;
    Ok(AdminOutcome::Success {
        detail: if dry_run {
            format!("{pruned} records eligible for pruning")
        } else {
            format!("{pruned} records pruned")
        },
    })
}
