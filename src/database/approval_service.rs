//! Approval ledger operations
//!
//! The ledger is append-only: pending entries are created when an entity
//! enters a review stage and resolved (approved, rejected or withdrawn) by
//! later actions. Resolved entries are immutable history and are never
//! deleted. The guarded `UPDATE ... WHERE status = 'pending'` is the only
//! lock concurrent reviewers contend on: the loser of a race simply matches
//! zero rows.

use sqlx::{PgConnection, PgPool};
use tracing::info;
use uuid::Uuid;

use crate::error::{WorkflowError, WorkflowResult};
use crate::models::{ApprovalRow, ApprovalStatus};
use crate::stage::EntityKind;

/// Service for approval ledger operations
#[derive(Clone, Debug)]
pub struct ApprovalService {
    pool: PgPool,
}

impl ApprovalService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Full ledger history for an entity, oldest first
    pub async fn list_for_entity(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
    ) -> WorkflowResult<Vec<ApprovalRow>> {
        let rows = sqlx::query_as::<_, ApprovalRow>(
            r#"
            SELECT approval_id, entity_kind, entity_id, stage, status,
                   approved_by, remarks, created_at, resolved_at
            FROM approvals
            WHERE entity_kind = $1 AND entity_id = $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(kind.as_str())
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// The pending entry for an entity/stage, if one exists
    pub async fn find_pending(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
        stage: i32,
    ) -> WorkflowResult<Option<ApprovalRow>> {
        let row = sqlx::query_as::<_, ApprovalRow>(
            r#"
            SELECT approval_id, entity_kind, entity_id, stage, status,
                   approved_by, remarks, created_at, resolved_at
            FROM approvals
            WHERE entity_kind = $1 AND entity_id = $2 AND stage = $3
              AND status = 'pending'
            "#,
        )
        .bind(kind.as_str())
        .bind(entity_id)
        .bind(stage)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Insert a pending entry for (entity, stage), assigned to `approver`.
    ///
    /// Guarded so that at most one pending entry per (entity, stage) can
    /// exist; a second concurrent creator gets a state error.
    pub async fn create_pending(
        &self,
        conn: &mut PgConnection,
        kind: EntityKind,
        entity_id: Uuid,
        stage: i32,
        approver: Uuid,
    ) -> WorkflowResult<Uuid> {
        let approval_id = Uuid::new_v4();

        let result = sqlx::query(
            r#"
            INSERT INTO approvals
                (approval_id, entity_kind, entity_id, stage, status, approved_by, created_at)
            SELECT $1, $2, $3, $4, 'pending', $5, NOW()
            WHERE NOT EXISTS (
                SELECT 1 FROM approvals
                WHERE entity_kind = $2 AND entity_id = $3 AND stage = $4
                  AND status = 'pending'
            )
            "#,
        )
        .bind(approval_id)
        .bind(kind.as_str())
        .bind(entity_id)
        .bind(stage)
        .bind(approver)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(WorkflowError::state(format!(
                "a pending approval already exists for {} {} at stage {}",
                kind.as_str(),
                entity_id,
                stage
            )));
        }

        info!(
            "Created pending approval {} for {} {} at stage {}",
            approval_id,
            kind.as_str(),
            entity_id,
            stage
        );
        Ok(approval_id)
    }

    /// Resolve the unique pending entry matching (entity, stage, approver).
    ///
    /// Wrong approver, already-resolved and stage-mismatch cases all match
    /// zero rows and are indistinguishable to the caller: a single
    /// "no matching pending approval" state error, safe to retry after
    /// reload.
    pub async fn resolve_pending(
        &self,
        conn: &mut PgConnection,
        kind: EntityKind,
        entity_id: Uuid,
        stage: i32,
        approver: Uuid,
        outcome: ApprovalStatus,
        remarks: &str,
    ) -> WorkflowResult<Uuid> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE approvals
            SET status = $1, remarks = $2, resolved_at = NOW()
            WHERE entity_kind = $3 AND entity_id = $4 AND stage = $5
              AND approved_by = $6 AND status = 'pending'
            RETURNING approval_id
            "#,
        )
        .bind(outcome.as_str())
        .bind(remarks)
        .bind(kind.as_str())
        .bind(entity_id)
        .bind(stage)
        .bind(approver)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some((approval_id,)) => {
                info!(
                    "Resolved approval {} for {} {} at stage {} as {}",
                    approval_id,
                    kind.as_str(),
                    entity_id,
                    stage,
                    outcome.as_str()
                );
                Ok(approval_id)
            }
            None => Err(WorkflowError::state(format!(
                "no matching pending approval for {} {} at stage {}",
                kind.as_str(),
                entity_id,
                stage
            ))),
        }
    }

    /// Withdraw any pending entry at `stage`, regardless of assignee.
    ///
    /// Used by `back`: regressing past a stage must not leave an orphaned
    /// pending entry behind. Matching zero rows is fine.
    pub async fn withdraw_pending(
        &self,
        conn: &mut PgConnection,
        kind: EntityKind,
        entity_id: Uuid,
        stage: i32,
    ) -> WorkflowResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE approvals
            SET status = 'withdrawn', resolved_at = NOW()
            WHERE entity_kind = $1 AND entity_id = $2 AND stage = $3
              AND status = 'pending'
            "#,
        )
        .bind(kind.as_str())
        .bind(entity_id)
        .bind(stage)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() > 0 {
            info!(
                "Withdrew {} pending approval(s) for {} {} at stage {}",
                result.rows_affected(),
                kind.as_str(),
                entity_id,
                stage
            );
        }
        Ok(result.rows_affected())
    }
}
