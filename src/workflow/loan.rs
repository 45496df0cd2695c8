//! Loan workflow transition service
//!
//! Orchestrates the loan pipeline: draft and documentation editing in the
//! self-service band, guarantor documentation sync, submission into the
//! review chain, per-stage approval resolution, and single-step regression.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::applicant::Applicant;
use crate::assignee::AssigneeResolver;
use crate::blob_store::{BlobStore, StoredFile};
use crate::config::WorkflowConfig;
use crate::database::{ApprovalService, LoanService, ReferenceService};
use crate::error::{WorkflowError, WorkflowResult};
use crate::models::{ApprovalRow, GuarantorSubmission, LoanApplicationFields, LoanRow, Verdict};
use crate::stage::{EntityKind, LoanStage, Phase, StageMachine};
use crate::workflow::cleanup_blobs;
use crate::workflow::diff::{plan_sync, Existing, Submitted};

/// Transition service for loan applications
pub struct LoanWorkflow {
    pool: PgPool,
    loans: LoanService,
    approvals: ApprovalService,
    reference: ReferenceService,
    blob: Arc<dyn BlobStore>,
    assignees: Arc<dyn AssigneeResolver>,
    config: WorkflowConfig,
}

impl LoanWorkflow {
    pub fn new(
        pool: PgPool,
        blob: Arc<dyn BlobStore>,
        assignees: Arc<dyn AssigneeResolver>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            loans: LoanService::new(pool.clone()),
            approvals: ApprovalService::new(pool.clone()),
            reference: ReferenceService::new(pool.clone()),
            pool,
            blob,
            assignees,
            config,
        }
    }

    /// Create a new application at the draft stage
    pub async fn create(
        &self,
        fields: LoanApplicationFields,
        actor: Uuid,
    ) -> WorkflowResult<LoanRow> {
        let applicant = Applicant::parse(&fields.applicant)?;
        self.validate_terms(&fields)?;
        self.validate_references(&fields).await?;

        let application = self.store_application_file(&fields).await?;

        let inserted = self
            .loans
            .insert(
                &applicant,
                &fields,
                application.as_ref(),
                LoanStage::Draft.as_int(),
                actor,
            )
            .await;
        match inserted {
            Ok(row) => Ok(row),
            Err(err) => {
                // The insert failed, so the stored form is an orphan.
                cleanup_blobs(
                    self.blob.as_ref(),
                    application.as_ref().map(|f| f.path.as_str()),
                )
                .await;
                Err(err)
            }
        }
    }

    /// Linear self-service advance: rewrite the form fields and move one
    /// stage forward, capped at the documentation ceiling.
    pub async fn advance(
        &self,
        loan_id: Uuid,
        fields: LoanApplicationFields,
        _actor: Uuid,
    ) -> WorkflowResult<LoanRow> {
        let applicant = Applicant::parse(&fields.applicant)?;
        self.validate_terms(&fields)?;
        self.validate_references(&fields).await?;

        let current = self.load(loan_id).await?;
        let stage = parse_stage(current.stage)?;
        require_self_service(stage)?;

        let application = self.store_application_file(&fields).await?;
        let replaced_path = if application.is_some() {
            current.application_path.clone()
        } else {
            None
        };

        let applied: WorkflowResult<LoanRow> = async {
            let mut tx = self.pool.begin().await?;
            let locked = self
                .loans
                .get_for_update(&mut tx, loan_id)
                .await?
                .ok_or_else(|| WorkflowError::NotFound(format!("loan {loan_id}")))?;
            let stage = parse_stage(locked.stage)?;
            require_self_service(stage)?;

            let row = self
                .loans
                .update_application(
                    &mut tx,
                    loan_id,
                    &applicant,
                    &fields,
                    application.as_ref(),
                    stage.linear_next().as_int(),
                )
                .await?;
            tx.commit().await?;
            Ok(row)
        }
        .await;

        let row = match applied {
            Ok(row) => row,
            Err(err) => {
                // The row writes rolled back; the freshly stored form is
                // an orphan.
                cleanup_blobs(
                    self.blob.as_ref(),
                    application.as_ref().map(|f| f.path.as_str()),
                )
                .await;
                return Err(err);
            }
        };

        cleanup_blobs(self.blob.as_ref(), replaced_path.as_deref()).await;

        info!("Advanced loan {} to stage {}", loan_id, row.stage);
        Ok(row)
    }

    /// Documentation sync: set the supplied self-service stage and make the
    /// attached guarantor set exactly equal the submitted set.
    pub async fn sync_guarantors(
        &self,
        loan_id: Uuid,
        stage: i32,
        items: Vec<GuarantorSubmission>,
    ) -> WorkflowResult<LoanRow> {
        if items.len() > self.config.max_items_per_sync {
            return Err(WorkflowError::validation(
                "guarantors",
                format!("at most {} guarantors per submission", self.config.max_items_per_sync),
            ));
        }
        let mut seen = HashSet::new();
        for item in &items {
            if !seen.insert(item.guarantor_id) {
                return Err(WorkflowError::validation(
                    "guarantors",
                    format!("guarantor {} submitted more than once", item.guarantor_id),
                ));
            }
        }

        // The target stage comes from the caller, bounded by the enum and
        // the self-service band; it is not re-derived.
        let target = LoanStage::from_int(stage).ok_or_else(|| {
            WorkflowError::validation("stage", format!("'{stage}' is not a loan stage"))
        })?;
        require_self_service(target)?;

        let current = self.load(loan_id).await?;
        require_self_service(parse_stage(current.stage)?)?;

        for item in &items {
            if !self.reference.guarantor_exists(item.guarantor_id).await? {
                return Err(WorkflowError::validation(
                    "guarantor_id",
                    format!("unknown guarantor {}", item.guarantor_id),
                ));
            }
        }

        let existing: Vec<Existing<Uuid>> = self
            .loans
            .list_guarantors(loan_id)
            .await?
            .into_iter()
            .map(|link| Existing {
                key: link.guarantor_id,
                row_id: link.link_id,
                collateral_path: link.collateral_path,
            })
            .collect();
        let submitted: Vec<Submitted<Uuid>> = items
            .iter()
            .map(|item| Submitted {
                key: item.guarantor_id,
                has_new_file: item.collateral.is_some(),
            })
            .collect();
        let plan = plan_sync(&existing, &submitted);

        // New uploads are stored before the transaction opens; a store
        // failure is fatal for the whole transition.
        let mut stored: HashMap<Uuid, StoredFile> = HashMap::new();
        for item in &items {
            if let Some(upload) = &item.collateral {
                match self
                    .blob
                    .store(&self.config.loan_collateral_folder, upload)
                    .await
                {
                    Ok(file) => {
                        stored.insert(item.guarantor_id, file);
                    }
                    Err(err) => {
                        cleanup_blobs(
                            self.blob.as_ref(),
                            stored.values().map(|f| f.path.clone()),
                        )
                        .await;
                        return Err(err.into());
                    }
                }
            }
        }

        let applied: WorkflowResult<()> = async {
            let mut tx = self.pool.begin().await?;
            let locked = self
                .loans
                .get_for_update(&mut tx, loan_id)
                .await?
                .ok_or_else(|| WorkflowError::NotFound(format!("loan {loan_id}")))?;
            require_self_service(parse_stage(locked.stage)?)?;

            self.loans
                .set_stage(&mut tx, loan_id, target.as_int())
                .await?;

            for guarantor_id in &plan.inserts {
                self.loans
                    .insert_guarantor(&mut tx, loan_id, *guarantor_id, stored.get(guarantor_id))
                    .await?;
            }
            for update in &plan.updates {
                // `has_new_file` implies the upload was stored above.
                if let Some(file) = stored.get(&update.key) {
                    self.loans
                        .update_guarantor_collateral(&mut tx, update.row_id, file)
                        .await?;
                }
            }
            for delete in &plan.deletes {
                self.loans
                    .delete_guarantor_link(&mut tx, delete.row_id)
                    .await?;
            }
            tx.commit().await?;
            Ok(())
        }
        .await;

        if let Err(err) = applied {
            // The row writes rolled back; the freshly stored uploads are
            // now orphans.
            cleanup_blobs(self.blob.as_ref(), stored.values().map(|f| f.path.clone())).await;
            return Err(err);
        }

        cleanup_blobs(self.blob.as_ref(), plan.cleanup_paths()).await;

        info!(
            "Synced {} guarantor(s) for loan {} at stage {}",
            items.len(),
            loan_id,
            target.as_int()
        );
        self.load(loan_id).await
    }

    /// Enter the formal review chain
    pub async fn submit(
        &self,
        loan_id: Uuid,
        remarks: &str,
        actor: Uuid,
    ) -> WorkflowResult<LoanRow> {
        let remarks = remarks.trim();
        if remarks.is_empty() {
            return Err(WorkflowError::validation(
                "submit_remarks",
                "submission remarks are required",
            ));
        }

        let mut tx = self.pool.begin().await?;
        let locked = self
            .loans
            .get_for_update(&mut tx, loan_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("loan {loan_id}")))?;
        require_self_service(parse_stage(locked.stage)?)?;

        let first_review = LoanStage::FIRST_REVIEW;
        self.loans
            .set_submitted(&mut tx, loan_id, first_review.as_int(), remarks)
            .await?;

        let assignee = self
            .assignees
            .assignee_for(EntityKind::Loan, first_review.as_int(), actor)
            .await?;
        self.approvals
            .create_pending(&mut tx, EntityKind::Loan, loan_id, first_review.as_int(), assignee)
            .await?;
        tx.commit().await?;

        info!("Submitted loan {} for review", loan_id);
        self.load(loan_id).await
    }

    /// Resolve the caller's pending approval at the current stage.
    ///
    /// An approved verdict advances one transition-table step and opens the
    /// next pending entry; a rejected verdict moves the loan to the
    /// rejected terminal stage. Exactly one of two concurrent callers wins
    /// the pending-entry update; the loser gets a state error.
    pub async fn review(
        &self,
        loan_id: Uuid,
        actor: Uuid,
        verdict: Verdict,
        remarks: &str,
    ) -> WorkflowResult<LoanRow> {
        // The stage the caller is acting on. If another reviewer commits
        // first, the locked re-read below disagrees and this call fails
        // closed instead of silently resolving the next stage's entry.
        let observed = parse_stage(self.load(loan_id).await?.stage)?;
        if !observed.is_review() {
            return Err(WorkflowError::state(format!(
                "loan {} is at stage {}, which is not a review stage",
                loan_id,
                observed.as_int()
            )));
        }

        let mut tx = self.pool.begin().await?;
        let locked = self
            .loans
            .get_for_update(&mut tx, loan_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("loan {loan_id}")))?;
        let stage = parse_stage(locked.stage)?;
        if stage != observed {
            return Err(WorkflowError::state(format!(
                "loan {} moved to stage {} while the review was in flight",
                loan_id,
                stage.as_int()
            )));
        }

        self.approvals
            .resolve_pending(
                &mut tx,
                EntityKind::Loan,
                loan_id,
                stage.as_int(),
                actor,
                verdict.as_status(),
                remarks,
            )
            .await?;

        match verdict {
            Verdict::Approved => {
                if let Some(next) = stage.next_review() {
                    self.loans.set_stage(&mut tx, loan_id, next.as_int()).await?;
                    if next.is_review() {
                        let assignee = self
                            .assignees
                            .assignee_for(EntityKind::Loan, next.as_int(), actor)
                            .await?;
                        self.approvals
                            .create_pending(
                                &mut tx,
                                EntityKind::Loan,
                                loan_id,
                                next.as_int(),
                                assignee,
                            )
                            .await?;
                    }
                }
            }
            Verdict::Rejected => {
                self.loans
                    .set_stage(&mut tx, loan_id, LoanStage::REJECTED.as_int())
                    .await?;
            }
        }
        tx.commit().await?;

        info!(
            "Reviewed loan {} at stage {}: {:?}",
            loan_id,
            stage.as_int(),
            verdict
        );
        self.load(loan_id).await
    }

    /// Single-step regression. Silent no-op at the floor. Any pending
    /// approval at the stage being left is withdrawn so regression never
    /// strands a live pending entry.
    pub async fn back(&self, loan_id: Uuid, _actor: Uuid) -> WorkflowResult<LoanRow> {
        let current = self.load(loan_id).await?;
        if parse_stage(current.stage)?.previous().is_none() {
            return Ok(current);
        }

        let mut tx = self.pool.begin().await?;
        let locked = self
            .loans
            .get_for_update(&mut tx, loan_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("loan {loan_id}")))?;
        let stage = parse_stage(locked.stage)?;
        let Some(previous) = stage.previous() else {
            return Ok(locked);
        };

        self.approvals
            .withdraw_pending(&mut tx, EntityKind::Loan, loan_id, stage.as_int())
            .await?;
        self.loans
            .set_stage(&mut tx, loan_id, previous.as_int())
            .await?;
        tx.commit().await?;

        info!(
            "Moved loan {} back from stage {} to {}",
            loan_id,
            stage.as_int(),
            previous.as_int()
        );
        self.load(loan_id).await
    }

    /// Delete a draft-stage application and its attached documents. Records
    /// with any ledger history are past draft and cannot be deleted.
    pub async fn delete_draft(&self, loan_id: Uuid) -> WorkflowResult<()> {
        let current = self.load(loan_id).await?;
        if parse_stage(current.stage)? != LoanStage::Draft {
            return Err(WorkflowError::state(format!(
                "loan {} is past the draft stage and cannot be deleted",
                loan_id
            )));
        }

        let mut tx = self.pool.begin().await?;
        let mut orphaned = self.loans.delete_all_guarantors(&mut tx, loan_id).await?;
        self.loans.delete(&mut tx, loan_id).await?;
        tx.commit().await?;

        orphaned.extend(current.application_path.clone());
        cleanup_blobs(self.blob.as_ref(), orphaned).await;

        info!("Deleted draft loan {}", loan_id);
        Ok(())
    }

    // ==========================================
    // READ SURFACE
    // ==========================================

    pub async fn get(&self, loan_id: Uuid) -> WorkflowResult<LoanRow> {
        self.load(loan_id).await
    }

    pub async fn list_by_stage(&self, stage: LoanStage) -> WorkflowResult<Vec<LoanRow>> {
        self.loans.list_by_stage(stage.as_int()).await
    }

    pub async fn guarantors(&self, loan_id: Uuid) -> WorkflowResult<Vec<crate::models::GuarantorLinkRow>> {
        self.loans.list_guarantors(loan_id).await
    }

    pub async fn approval_history(&self, loan_id: Uuid) -> WorkflowResult<Vec<ApprovalRow>> {
        self.approvals.list_for_entity(EntityKind::Loan, loan_id).await
    }

    // ==========================================
    // INTERNALS
    // ==========================================

    async fn load(&self, loan_id: Uuid) -> WorkflowResult<LoanRow> {
        self.loans
            .get(loan_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("loan {loan_id}")))
    }

    fn validate_terms(&self, fields: &LoanApplicationFields) -> WorkflowResult<()> {
        if fields.loan_amount <= Decimal::ZERO {
            return Err(WorkflowError::validation(
                "loan_amount",
                "loan amount must be positive",
            ));
        }
        if fields.loan_duration <= 0 {
            return Err(WorkflowError::validation(
                "loan_duration",
                "loan duration must be at least one month",
            ));
        }
        if fields.interest_rate < Decimal::ZERO || fields.interest_amount < Decimal::ZERO {
            return Err(WorkflowError::validation(
                "interest_rate",
                "interest figures cannot be negative",
            ));
        }
        Ok(())
    }

    async fn validate_references(&self, fields: &LoanApplicationFields) -> WorkflowResult<()> {
        if !self.reference.package_exists(fields.package_id).await? {
            return Err(WorkflowError::validation(
                "package_id",
                format!("unknown package {}", fields.package_id),
            ));
        }
        if !self.reference.branch_exists(fields.branch_id).await? {
            return Err(WorkflowError::validation(
                "branch_id",
                format!("unknown branch {}", fields.branch_id),
            ));
        }
        Ok(())
    }

    async fn store_application_file(
        &self,
        fields: &LoanApplicationFields,
    ) -> WorkflowResult<Option<StoredFile>> {
        match &fields.application_file {
            Some(upload) => {
                let stored = self
                    .blob
                    .store(&self.config.loan_application_folder, upload)
                    .await?;
                Ok(Some(stored))
            }
            None => Ok(None),
        }
    }
}

fn parse_stage(value: i32) -> WorkflowResult<LoanStage> {
    LoanStage::from_int(value)
        .ok_or_else(|| WorkflowError::state(format!("unrecognized loan stage {value}")))
}

fn require_self_service(stage: LoanStage) -> WorkflowResult<()> {
    match stage.phase() {
        Phase::SelfService => Ok(()),
        Phase::Review => Err(WorkflowError::state(format!(
            "stage {} is under review; self-service editing is closed",
            stage.as_int()
        ))),
        Phase::Terminal => Err(WorkflowError::state(format!(
            "stage {} is terminal",
            stage.as_int()
        ))),
    }
}
