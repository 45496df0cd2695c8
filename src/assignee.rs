//! Approver assignment
//!
//! Each review stage must resolve to the actor responsible for it. The
//! resolver is a seam: production deployments back it with role lookup,
//! which is outside this crate.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::WorkflowResult;
use crate::stage::EntityKind;

/// Resolves the assignee for a pending approval at a given stage
#[async_trait]
pub trait AssigneeResolver: Send + Sync {
    /// Actor to assign the pending entry created when `kind`/`stage` is
    /// entered. `acting` is the actor whose action caused the entry.
    async fn assignee_for(
        &self,
        kind: EntityKind,
        stage: i32,
        acting: Uuid,
    ) -> WorkflowResult<Uuid>;
}

/// Assigns every stage to the acting actor.
///
/// This reproduces the single-approver chain the system launched with;
/// deployments with real role routing substitute their own resolver.
pub struct SelfAssign;

#[async_trait]
impl AssigneeResolver for SelfAssign {
    async fn assignee_for(
        &self,
        _kind: EntityKind,
        _stage: i32,
        acting: Uuid,
    ) -> WorkflowResult<Uuid> {
        Ok(acting)
    }
}
