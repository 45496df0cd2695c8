//! Site workflow transition service
//!
//! Orchestrates the land-site pipeline: draft editing, boundary coordinate
//! capture at the coordinating step, investor documentation sync, the
//! review chain, regression, and archival of approved sites.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::applicant::Applicant;
use crate::assignee::AssigneeResolver;
use crate::blob_store::{BlobStore, StoredFile};
use crate::config::WorkflowConfig;
use crate::database::{ApprovalService, ReferenceService, SiteService};
use crate::error::{WorkflowError, WorkflowResult};
use crate::models::{
    ApprovalRow, CoordinateRow, CoordinateSubmission, InvestorLinkRow, InvestorSubmission,
    SiteApplicationFields, SiteRow, Verdict,
};
use crate::stage::{EntityKind, Phase, SiteStage, StageMachine};
use crate::workflow::cleanup_blobs;
use crate::workflow::diff::{plan_sync, Existing, Submitted};

/// Transition service for land-site applications
pub struct SiteWorkflow {
    pool: PgPool,
    sites: SiteService,
    approvals: ApprovalService,
    reference: ReferenceService,
    blob: Arc<dyn BlobStore>,
    assignees: Arc<dyn AssigneeResolver>,
    config: WorkflowConfig,
}

impl SiteWorkflow {
    pub fn new(
        pool: PgPool,
        blob: Arc<dyn BlobStore>,
        assignees: Arc<dyn AssigneeResolver>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            sites: SiteService::new(pool.clone()),
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
        fields: SiteApplicationFields,
        actor: Uuid,
    ) -> WorkflowResult<SiteRow> {
        let applicant = Applicant::parse(&fields.applicant)?;
        self.validate_references(&fields).await?;

        let application = self.store_application_file(&fields).await?;

        let inserted = self
            .sites
            .insert(
                &applicant,
                &fields,
                application.as_ref(),
                SiteStage::Draft.as_int(),
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

    /// Linear self-service advance through draft → coordinating →
    /// documentation, capped at the ceiling.
    pub async fn advance(
        &self,
        site_id: Uuid,
        fields: SiteApplicationFields,
        _actor: Uuid,
    ) -> WorkflowResult<SiteRow> {
        let applicant = Applicant::parse(&fields.applicant)?;
        self.validate_references(&fields).await?;

        let current = self.load(site_id).await?;
        require_self_service(parse_stage(current.stage)?)?;

        let application = self.store_application_file(&fields).await?;
        let replaced_path = if application.is_some() {
            current.application_path.clone()
        } else {
            None
        };

        let applied: WorkflowResult<SiteRow> = async {
            let mut tx = self.pool.begin().await?;
            let locked = self
                .sites
                .get_for_update(&mut tx, site_id)
                .await?
                .ok_or_else(|| WorkflowError::NotFound(format!("site {site_id}")))?;
            let stage = parse_stage(locked.stage)?;
            require_self_service(stage)?;

            let row = self
                .sites
                .update_application(
                    &mut tx,
                    site_id,
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

        info!("Advanced site {} to stage {}", site_id, row.stage);
        Ok(row)
    }

    /// Coordinating sync: set the supplied self-service stage and make the
    /// stored boundary exactly equal the submitted coordinate set,
    /// keyed by the (latitude, longitude) value pair.
    pub async fn sync_coordinates(
        &self,
        site_id: Uuid,
        stage: i32,
        coordinates: Vec<CoordinateSubmission>,
    ) -> WorkflowResult<SiteRow> {
        if coordinates.len() > self.config.max_items_per_sync {
            return Err(WorkflowError::validation(
                "coordinates",
                format!(
                    "at most {} coordinates per submission",
                    self.config.max_items_per_sync
                ),
            ));
        }
        let mut seen = HashSet::new();
        for coordinate in &coordinates {
            coordinate.validate()?;
            if !seen.insert(coordinate.key()) {
                return Err(WorkflowError::validation(
                    "coordinates",
                    format!(
                        "coordinate ({}, {}) submitted more than once",
                        coordinate.latitude, coordinate.longitude
                    ),
                ));
            }
        }

        let target = SiteStage::from_int(stage).ok_or_else(|| {
            WorkflowError::validation("stage", format!("'{stage}' is not a site stage"))
        })?;
        require_self_service(target)?;

        let current = self.load(site_id).await?;
        require_self_service(parse_stage(current.stage)?)?;

        let existing: Vec<Existing<(i64, i64)>> = self
            .sites
            .list_coordinates(site_id)
            .await?
            .into_iter()
            .map(|row| Existing {
                key: row.key(),
                row_id: row.coordinate_id,
                collateral_path: None,
            })
            .collect();
        let submitted: Vec<Submitted<(i64, i64)>> = coordinates
            .iter()
            .map(|c| Submitted {
                key: c.key(),
                has_new_file: false,
            })
            .collect();
        let plan = plan_sync(&existing, &submitted);
        let by_key: HashMap<(i64, i64), &CoordinateSubmission> =
            coordinates.iter().map(|c| (c.key(), c)).collect();

        let mut tx = self.pool.begin().await?;
        let locked = self
            .sites
            .get_for_update(&mut tx, site_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("site {site_id}")))?;
        require_self_service(parse_stage(locked.stage)?)?;

        self.sites.set_stage(&mut tx, site_id, target.as_int()).await?;
        for key in &plan.inserts {
            if let Some(coordinate) = by_key.get(key) {
                self.sites
                    .insert_coordinate(&mut tx, site_id, coordinate)
                    .await?;
            }
        }
        for delete in &plan.deletes {
            self.sites.delete_coordinate(&mut tx, delete.row_id).await?;
        }
        tx.commit().await?;

        info!(
            "Synced {} coordinate(s) for site {} at stage {}",
            coordinates.len(),
            site_id,
            target.as_int()
        );
        self.load(site_id).await
    }

    /// Documentation sync: make the attached investor set exactly equal the
    /// submitted set.
    pub async fn sync_investors(
        &self,
        site_id: Uuid,
        stage: i32,
        items: Vec<InvestorSubmission>,
    ) -> WorkflowResult<SiteRow> {
        if items.len() > self.config.max_items_per_sync {
            return Err(WorkflowError::validation(
                "investors",
                format!("at most {} investors per submission", self.config.max_items_per_sync),
            ));
        }
        let mut seen = HashSet::new();
        for item in &items {
            if !seen.insert(item.investor_id) {
                return Err(WorkflowError::validation(
                    "investors",
                    format!("investor {} submitted more than once", item.investor_id),
                ));
            }
        }

        let target = SiteStage::from_int(stage).ok_or_else(|| {
            WorkflowError::validation("stage", format!("'{stage}' is not a site stage"))
        })?;
        require_self_service(target)?;

        let current = self.load(site_id).await?;
        require_self_service(parse_stage(current.stage)?)?;

        for item in &items {
            if !self.reference.investor_exists(item.investor_id).await? {
                return Err(WorkflowError::validation(
                    "investor_id",
                    format!("unknown investor {}", item.investor_id),
                ));
            }
        }

        let existing: Vec<Existing<Uuid>> = self
            .sites
            .list_investors(site_id)
            .await?
            .into_iter()
            .map(|link| Existing {
                key: link.investor_id,
                row_id: link.link_id,
                collateral_path: link.collateral_path,
            })
            .collect();
        let submitted: Vec<Submitted<Uuid>> = items
            .iter()
            .map(|item| Submitted {
                key: item.investor_id,
                has_new_file: item.collateral.is_some(),
            })
            .collect();
        let plan = plan_sync(&existing, &submitted);

        let mut stored: HashMap<Uuid, StoredFile> = HashMap::new();
        for item in &items {
            if let Some(upload) = &item.collateral {
                match self
                    .blob
                    .store(&self.config.site_collateral_folder, upload)
                    .await
                {
                    Ok(file) => {
                        stored.insert(item.investor_id, file);
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
                .sites
                .get_for_update(&mut tx, site_id)
                .await?
                .ok_or_else(|| WorkflowError::NotFound(format!("site {site_id}")))?;
            require_self_service(parse_stage(locked.stage)?)?;

            self.sites.set_stage(&mut tx, site_id, target.as_int()).await?;
            for investor_id in &plan.inserts {
                self.sites
                    .insert_investor(&mut tx, site_id, *investor_id, stored.get(investor_id))
                    .await?;
            }
            for update in &plan.updates {
                if let Some(file) = stored.get(&update.key) {
                    self.sites
                        .update_investor_collateral(&mut tx, update.row_id, file)
                        .await?;
                }
            }
            for delete in &plan.deletes {
                self.sites.delete_investor_link(&mut tx, delete.row_id).await?;
            }
            tx.commit().await?;
            Ok(())
        }
        .await;

        if let Err(err) = applied {
            cleanup_blobs(self.blob.as_ref(), stored.values().map(|f| f.path.clone())).await;
            return Err(err);
        }

        cleanup_blobs(self.blob.as_ref(), plan.cleanup_paths()).await;

        info!(
            "Synced {} investor(s) for site {} at stage {}",
            items.len(),
            site_id,
            target.as_int()
        );
        self.load(site_id).await
    }

    /// Enter the formal review chain
    pub async fn submit(
        &self,
        site_id: Uuid,
        remarks: &str,
        actor: Uuid,
    ) -> WorkflowResult<SiteRow> {
        let remarks = remarks.trim();
        if remarks.is_empty() {
            return Err(WorkflowError::validation(
                "submit_remarks",
                "submission remarks are required",
            ));
        }

        let mut tx = self.pool.begin().await?;
        let locked = self
            .sites
            .get_for_update(&mut tx, site_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("site {site_id}")))?;
        require_self_service(parse_stage(locked.stage)?)?;

        let first_review = SiteStage::FIRST_REVIEW;
        self.sites
            .set_submitted(&mut tx, site_id, first_review.as_int(), remarks)
            .await?;

        let assignee = self
            .assignees
            .assignee_for(EntityKind::Site, first_review.as_int(), actor)
            .await?;
        self.approvals
            .create_pending(&mut tx, EntityKind::Site, site_id, first_review.as_int(), assignee)
            .await?;
        tx.commit().await?;

        info!("Submitted site {} for review", site_id);
        self.load(site_id).await
    }

    /// Resolve the caller's pending approval at the current stage
    pub async fn review(
        &self,
        site_id: Uuid,
        actor: Uuid,
        verdict: Verdict,
        remarks: &str,
    ) -> WorkflowResult<SiteRow> {
        // The stage the caller is acting on. If another reviewer commits
        // first, the locked re-read below disagrees and this call fails
        // closed instead of silently resolving the next stage's entry.
        let observed = parse_stage(self.load(site_id).await?.stage)?;
        if !observed.is_review() {
            return Err(WorkflowError::state(format!(
                "site {} is at stage {}, which is not a review stage",
                site_id,
                observed.as_int()
            )));
        }

        let mut tx = self.pool.begin().await?;
        let locked = self
            .sites
            .get_for_update(&mut tx, site_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("site {site_id}")))?;
        let stage = parse_stage(locked.stage)?;
        if stage != observed {
            return Err(WorkflowError::state(format!(
                "site {} moved to stage {} while the review was in flight",
                site_id,
                stage.as_int()
            )));
        }

        self.approvals
            .resolve_pending(
                &mut tx,
                EntityKind::Site,
                site_id,
                stage.as_int(),
                actor,
                verdict.as_status(),
                remarks,
            )
            .await?;

        match verdict {
            Verdict::Approved => {
                if let Some(next) = stage.next_review() {
                    self.sites.set_stage(&mut tx, site_id, next.as_int()).await?;
                    if next.is_review() {
                        let assignee = self
                            .assignees
                            .assignee_for(EntityKind::Site, next.as_int(), actor)
                            .await?;
                        self.approvals
                            .create_pending(
                                &mut tx,
                                EntityKind::Site,
                                site_id,
                                next.as_int(),
                                assignee,
                            )
                            .await?;
                    }
                }
            }
            Verdict::Rejected => {
                self.sites
                    .set_stage(&mut tx, site_id, SiteStage::REJECTED.as_int())
                    .await?;
            }
        }
        tx.commit().await?;

        info!(
            "Reviewed site {} at stage {}: {:?}",
            site_id,
            stage.as_int(),
            verdict
        );
        self.load(site_id).await
    }

    /// Single-step regression; withdraws any pending entry at the stage
    /// being left. Silent no-op at the floor.
    pub async fn back(&self, site_id: Uuid, _actor: Uuid) -> WorkflowResult<SiteRow> {
        let current = self.load(site_id).await?;
        if parse_stage(current.stage)?.previous().is_none() {
            return Ok(current);
        }

        let mut tx = self.pool.begin().await?;
        let locked = self
            .sites
            .get_for_update(&mut tx, site_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("site {site_id}")))?;
        let stage = parse_stage(locked.stage)?;
        let Some(previous) = stage.previous() else {
            return Ok(locked);
        };

        self.approvals
            .withdraw_pending(&mut tx, EntityKind::Site, site_id, stage.as_int())
            .await?;
        self.sites
            .set_stage(&mut tx, site_id, previous.as_int())
            .await?;
        tx.commit().await?;

        info!(
            "Moved site {} back from stage {} to {}",
            site_id,
            stage.as_int(),
            previous.as_int()
        );
        self.load(site_id).await
    }

    /// Archive an approved site into the history band
    pub async fn archive(&self, site_id: Uuid, _actor: Uuid) -> WorkflowResult<SiteRow> {
        let mut tx = self.pool.begin().await?;
        let locked = self
            .sites
            .get_for_update(&mut tx, site_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("site {site_id}")))?;
        if parse_stage(locked.stage)? != SiteStage::Approved {
            return Err(WorkflowError::state(format!(
                "site {} is at stage {}; only approved sites can be archived",
                site_id, locked.stage
            )));
        }

        self.sites
            .set_stage(&mut tx, site_id, SiteStage::History.as_int())
            .await?;
        tx.commit().await?;

        info!("Archived site {}", site_id);
        self.load(site_id).await
    }

    /// Delete a draft-stage application and its attached documents
    pub async fn delete_draft(&self, site_id: Uuid) -> WorkflowResult<()> {
        let current = self.load(site_id).await?;
        if parse_stage(current.stage)? != SiteStage::Draft {
            return Err(WorkflowError::state(format!(
                "site {} is past the draft stage and cannot be deleted",
                site_id
            )));
        }

        let mut tx = self.pool.begin().await?;
        let mut orphaned = self.sites.delete_all_investors(&mut tx, site_id).await?;
        self.sites.delete_all_coordinates(&mut tx, site_id).await?;
        self.sites.delete(&mut tx, site_id).await?;
        tx.commit().await?;

        orphaned.extend(current.application_path.clone());
        cleanup_blobs(self.blob.as_ref(), orphaned).await;

        info!("Deleted draft site {}", site_id);
        Ok(())
    }

    // ==========================================
    // READ SURFACE
    // ==========================================

    pub async fn get(&self, site_id: Uuid) -> WorkflowResult<SiteRow> {
        self.load(site_id).await
    }

    pub async fn list_by_stage(&self, stage: SiteStage) -> WorkflowResult<Vec<SiteRow>> {
        self.sites.list_by_stage(stage.as_int()).await
    }

    pub async fn investors(&self, site_id: Uuid) -> WorkflowResult<Vec<InvestorLinkRow>> {
        self.sites.list_investors(site_id).await
    }

    pub async fn coordinates(&self, site_id: Uuid) -> WorkflowResult<Vec<CoordinateRow>> {
        self.sites.list_coordinates(site_id).await
    }

    pub async fn approval_history(&self, site_id: Uuid) -> WorkflowResult<Vec<ApprovalRow>> {
        self.approvals.list_for_entity(EntityKind::Site, site_id).await
    }

    // ==========================================
    // INTERNALS
    // ==========================================

    async fn load(&self, site_id: Uuid) -> WorkflowResult<SiteRow> {
        self.sites
            .get(site_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("site {site_id}")))
    }

    async fn validate_references(&self, fields: &SiteApplicationFields) -> WorkflowResult<()> {
        if !self.reference.sector_exists(fields.sector_id).await? {
            return Err(WorkflowError::validation(
                "sector_id",
                format!("unknown sector {}", fields.sector_id),
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
        fields: &SiteApplicationFields,
    ) -> WorkflowResult<Option<StoredFile>> {
        match &fields.application_file {
            Some(upload) => {
                let stored = self
                    .blob
                    .store(&self.config.site_application_folder, upload)
                    .await?;
                Ok(Some(stored))
            }
            None => Ok(None),
        }
    }
}

fn parse_stage(value: i32) -> WorkflowResult<SiteStage> {
    SiteStage::from_int(value)
        .ok_or_else(|| WorkflowError::state(format!("unrecognized site stage {value}")))
}

fn require_self_service(stage: SiteStage) -> WorkflowResult<()> {
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
