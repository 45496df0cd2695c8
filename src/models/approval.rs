//! Approval ledger types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle of a ledger entry. Pending entries are the only mutable ones;
/// once resolved they are immutable history and are never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    /// Resolution applied when a `back` regression bypasses the stage the
    /// entry was waiting on.
    Withdrawn,
}

impl ApprovalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
            ApprovalStatus::Withdrawn => "withdrawn",
        }
    }
}

/// Outcome of a review action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    Rejected,
}

impl Verdict {
    pub fn as_status(self) -> ApprovalStatus {
        match self {
            Verdict::Approved => ApprovalStatus::Approved,
            Verdict::Rejected => ApprovalStatus::Rejected,
        }
    }
}

/// One approval attempt for a given entity/stage/approver
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ApprovalRow {
    pub approval_id: Uuid,
    pub entity_kind: String,
    pub entity_id: Uuid,
    pub stage: i32,
    pub status: String,
    pub approved_by: Uuid,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ApprovalRow {
    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending.as_str()
    }
}
