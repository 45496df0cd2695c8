//! E2E tests for the loan workflow: create, linear advance, guarantor
//! documentation sync, submit, review chain, regression.
//!
//! These tests MUST execute against a real database; they are ignored by
//! default and run with `cargo test -- --ignored` when DATABASE_URL is set.

mod common;

use common::{loan_harness, LoanHarness, ReferenceIds};
use rust_decimal_macros::dec;
use uuid::Uuid;

use landloan_workflow::models::{GuarantorSubmission, LoanApplicationFields, Verdict};
use landloan_workflow::{
    ApplicantPayload, BlobStore, FileUpload, LoanStage, StageMachine, WorkflowError,
};

fn individual(first: &str, surname: &str) -> ApplicantPayload {
    ApplicantPayload {
        customer_type: "individual".to_string(),
        first_name: Some(first.to_string()),
        other_names: None,
        surname: Some(surname.to_string()),
        company_name: None,
    }
}

fn loan_fields(refs: &ReferenceIds) -> LoanApplicationFields {
    LoanApplicationFields {
        applicant: individual("A", "B"),
        package_id: refs.package_id,
        branch_id: refs.branch_id,
        loan_amount: dec!(100_000),
        loan_duration: 12,
        interest_rate: dec!(10),
        // Caller-side formula; persisted as provided, not recomputed.
        interest_amount: dec!(10_000),
        application_file: None,
    }
}

fn upload(name: &str) -> FileUpload {
    FileUpload {
        original_name: name.to_string(),
        content: format!("contents of {name}").into_bytes(),
    }
}

async fn loan_at_documentation(harness: &LoanHarness) -> Uuid {
    let actor = Uuid::new_v4();
    let loan = harness
        .workflow
        .create(loan_fields(&harness.refs), actor)
        .await
        .expect("create failed");
    let loan = harness
        .workflow
        .advance(loan.loan_id, loan_fields(&harness.refs), actor)
        .await
        .expect("advance failed");
    assert_eq!(loan.stage, LoanStage::Documentation.as_int());
    loan.loan_id
}

#[tokio::test]
#[ignore = "requires a Postgres database via DATABASE_URL"]
async fn create_individual_loan_starts_at_draft() {
    let harness = loan_harness().await;
    let actor = Uuid::new_v4();

    let loan = harness
        .workflow
        .create(loan_fields(&harness.refs), actor)
        .await
        .expect("create failed");

    assert_eq!(loan.stage, 1);
    assert_eq!(loan.customer_type, "individual");
    assert_eq!(loan.first_name.as_deref(), Some("A"));
    assert_eq!(loan.surname.as_deref(), Some("B"));
    assert_eq!(loan.company_name, None);
    assert_eq!(loan.loan_amount, dec!(100_000));
    assert_eq!(loan.loan_duration, 12);
    assert_eq!(loan.interest_rate, dec!(10));
    assert_eq!(loan.interest_amount, dec!(10_000));
    assert_eq!(loan.created_by, actor);
}

#[tokio::test]
#[ignore = "requires a Postgres database via DATABASE_URL"]
async fn full_review_chain_ends_approved() {
    let harness = loan_harness().await;
    let actor = Uuid::new_v4();
    let loan_id = loan_at_documentation(&harness).await;

    let loan = harness
        .workflow
        .submit(loan_id, "ready for review", actor)
        .await
        .expect("submit failed");
    assert_eq!(loan.stage, LoanStage::OfficerReview.as_int());
    assert_eq!(loan.submit_remarks.as_deref(), Some("ready for review"));

    for expected_next in [
        LoanStage::ManagerReview,
        LoanStage::CommitteeReview,
        LoanStage::Approved,
    ] {
        let loan = harness
            .workflow
            .review(loan_id, actor, Verdict::Approved, "ok")
            .await
            .expect("review failed");
        assert_eq!(loan.stage, expected_next.as_int());
    }

    let history = harness.workflow.approval_history(loan_id).await.unwrap();
    let approved = history.iter().filter(|a| a.status == "approved").count();
    let pending = history.iter().filter(|a| a.is_pending()).count();
    assert_eq!(approved, 3);
    assert_eq!(pending, 0, "terminal stage must not open a new pending entry");
}

#[tokio::test]
#[ignore = "requires a Postgres database via DATABASE_URL"]
async fn rejection_moves_loan_to_terminal_stage() {
    let harness = loan_harness().await;
    let actor = Uuid::new_v4();
    let loan_id = loan_at_documentation(&harness).await;

    harness
        .workflow
        .submit(loan_id, "ready", actor)
        .await
        .unwrap();
    let loan = harness
        .workflow
        .review(loan_id, actor, Verdict::Rejected, "insufficient collateral")
        .await
        .unwrap();

    assert_eq!(loan.stage, LoanStage::Rejected.as_int());
    let history = harness.workflow.approval_history(loan_id).await.unwrap();
    assert!(history.iter().any(|a| a.status == "rejected"));
    assert!(!history.iter().any(|a| a.is_pending()));
}

#[tokio::test]
#[ignore = "requires a Postgres database via DATABASE_URL"]
async fn unsubmitted_guarantor_is_removed_with_its_file() {
    let harness = loan_harness().await;
    let loan_id = loan_at_documentation(&harness).await;
    let stage = LoanStage::Documentation.as_int();

    harness
        .workflow
        .sync_guarantors(
            loan_id,
            stage,
            vec![GuarantorSubmission {
                guarantor_id: harness.refs.guarantor_id,
                collateral: Some(upload("doc.pdf")),
            }],
        )
        .await
        .expect("first sync failed");

    let links = harness.workflow.guarantors(loan_id).await.unwrap();
    assert_eq!(links.len(), 1);
    let path = links[0].collateral_path.clone().expect("collateral stored");
    assert_eq!(links[0].collateral_name.as_deref(), Some("doc.pdf"));
    assert!(harness.blob.exists(&path).await.unwrap());

    // Resubmit with an empty set: the link goes and the file delete is
    // attempted.
    harness
        .workflow
        .sync_guarantors(loan_id, stage, vec![])
        .await
        .expect("second sync failed");

    assert!(harness.workflow.guarantors(loan_id).await.unwrap().is_empty());
    assert!(!harness.blob.exists(&path).await.unwrap());
}

#[tokio::test]
#[ignore = "requires a Postgres database via DATABASE_URL"]
async fn resubmitting_the_same_set_changes_no_rows() {
    let harness = loan_harness().await;
    let loan_id = loan_at_documentation(&harness).await;
    let stage = LoanStage::Documentation.as_int();

    let items = || {
        vec![GuarantorSubmission {
            guarantor_id: harness.refs.guarantor_id,
            collateral: None,
        }]
    };

    harness
        .workflow
        .sync_guarantors(loan_id, stage, items())
        .await
        .unwrap();
    let before = harness.workflow.guarantors(loan_id).await.unwrap();

    harness
        .workflow
        .sync_guarantors(loan_id, stage, items())
        .await
        .unwrap();
    let after = harness.workflow.guarantors(loan_id).await.unwrap();

    assert_eq!(before.len(), 1);
    assert_eq!(before[0].link_id, after[0].link_id);
    assert_eq!(before[0].created_at, after[0].created_at);
}

#[tokio::test]
#[ignore = "requires a Postgres database via DATABASE_URL"]
async fn new_collateral_replaces_the_old_file_in_place() {
    let harness = loan_harness().await;
    let loan_id = loan_at_documentation(&harness).await;
    let stage = LoanStage::Documentation.as_int();

    harness
        .workflow
        .sync_guarantors(
            loan_id,
            stage,
            vec![GuarantorSubmission {
                guarantor_id: harness.refs.guarantor_id,
                collateral: Some(upload("old.pdf")),
            }],
        )
        .await
        .unwrap();
    let old_path = harness.workflow.guarantors(loan_id).await.unwrap()[0]
        .collateral_path
        .clone()
        .unwrap();

    harness
        .workflow
        .sync_guarantors(
            loan_id,
            stage,
            vec![GuarantorSubmission {
                guarantor_id: harness.refs.guarantor_id,
                collateral: Some(upload("new.pdf")),
            }],
        )
        .await
        .unwrap();

    let links = harness.workflow.guarantors(loan_id).await.unwrap();
    assert_eq!(links.len(), 1, "replacement updates in place");
    let new_path = links[0].collateral_path.clone().unwrap();
    assert_ne!(new_path, old_path);
    assert_eq!(links[0].collateral_name.as_deref(), Some("new.pdf"));
    assert!(!harness.blob.exists(&old_path).await.unwrap());
    assert!(harness.blob.exists(&new_path).await.unwrap());
}

#[tokio::test]
#[ignore = "requires a Postgres database via DATABASE_URL"]
async fn concurrent_reviews_produce_one_winner() {
    let harness = loan_harness().await;
    let actor = Uuid::new_v4();
    let loan_id = loan_at_documentation(&harness).await;
    harness
        .workflow
        .submit(loan_id, "ready", actor)
        .await
        .unwrap();
    for _ in 0..2 {
        harness
            .workflow
            .review(loan_id, actor, Verdict::Approved, "ok")
            .await
            .unwrap();
    }

    // Same actor, same pending entry, at the last review stage: the
    // winner resolves the entry and lands on the terminal stage, so the
    // loser's only possible outcomes are the resolved-entry zero-row
    // match or the stage re-check, whichever commits first. Nothing but
    // the pending-entry lookup decides the winner.
    let loan = harness.workflow.get(loan_id).await.unwrap();
    assert_eq!(loan.stage, LoanStage::CommitteeReview.as_int());

    let (first, second) = tokio::join!(
        harness.workflow.review(loan_id, actor, Verdict::Approved, "ok"),
        harness.workflow.review(loan_id, actor, Verdict::Approved, "ok"),
    );

    let outcomes = [first, second];
    let winners = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one concurrent review may win");
    let loser = outcomes.iter().find(|r| r.is_err()).unwrap();
    assert!(matches!(
        loser.as_ref().unwrap_err(),
        WorkflowError::State(_)
    ));

    let loan = harness.workflow.get(loan_id).await.unwrap();
    assert_eq!(
        loan.stage,
        LoanStage::Approved.as_int(),
        "stage advanced exactly once"
    );
    let history = harness.workflow.approval_history(loan_id).await.unwrap();
    assert_eq!(
        history.iter().filter(|a| a.status == "approved").count(),
        3,
        "the losing call must not resolve a second entry"
    );
}

#[tokio::test]
#[ignore = "requires a Postgres database via DATABASE_URL"]
async fn losing_advance_cleans_up_its_stored_replacement_file() {
    let LoanHarness {
        workflow,
        blob,
        refs,
        pool,
    } = loan_harness().await;
    let actor = Uuid::new_v4();

    let mut fields = loan_fields(&refs);
    fields.application_file = Some(upload("form.pdf"));
    let loan = workflow.create(fields, actor).await.unwrap();
    let loan_id = loan.loan_id;
    let loan = workflow
        .advance(loan_id, loan_fields(&refs), actor)
        .await
        .unwrap();
    assert_eq!(loan.stage, LoanStage::Documentation.as_int());
    assert_eq!(blob.len().await, 1);

    // Hold the row lock while a replacement advance is in flight, then
    // move the loan into review before releasing it. The advance stores
    // its new file, blocks on the lock, and must fail the locked stage
    // re-check once the lock is released.
    let mut tx = pool.begin().await.unwrap();
    sqlx::query("SELECT stage FROM loans WHERE loan_id = $1 FOR UPDATE")
        .bind(loan_id)
        .fetch_one(&mut *tx)
        .await
        .unwrap();

    let mut replacement = loan_fields(&refs);
    replacement.application_file = Some(upload("replacement.pdf"));
    let racing = tokio::spawn(async move { workflow.advance(loan_id, replacement, actor).await });
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    sqlx::query("UPDATE loans SET stage = $2 WHERE loan_id = $1")
        .bind(loan_id)
        .bind(LoanStage::OfficerReview.as_int())
        .execute(&mut *tx)
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let err = racing.await.unwrap().unwrap_err();
    assert!(matches!(err, WorkflowError::State(_)));
    assert_eq!(
        blob.len().await,
        1,
        "the loser's stored replacement must be deleted"
    );
}

#[tokio::test]
#[ignore = "requires a Postgres database via DATABASE_URL"]
async fn back_at_the_floor_is_a_silent_noop() {
    let harness = loan_harness().await;
    let actor = Uuid::new_v4();
    let loan = harness
        .workflow
        .create(loan_fields(&harness.refs), actor)
        .await
        .unwrap();

    let unchanged = harness.workflow.back(loan.loan_id, actor).await.unwrap();
    assert_eq!(unchanged.stage, 1);
}

#[tokio::test]
#[ignore = "requires a Postgres database via DATABASE_URL"]
async fn blank_submit_remarks_are_rejected_before_mutation() {
    let harness = loan_harness().await;
    let actor = Uuid::new_v4();
    let loan_id = loan_at_documentation(&harness).await;

    let err = harness
        .workflow
        .submit(loan_id, "   ", actor)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Validation { ref field, .. } if field == "submit_remarks"));

    let loan = harness.workflow.get(loan_id).await.unwrap();
    assert_eq!(loan.stage, LoanStage::Documentation.as_int());
    assert!(harness
        .workflow
        .approval_history(loan_id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
#[ignore = "requires a Postgres database via DATABASE_URL"]
async fn back_withdraws_the_bypassed_pending_entry() {
    let harness = loan_harness().await;
    let actor = Uuid::new_v4();
    let loan_id = loan_at_documentation(&harness).await;
    harness
        .workflow
        .submit(loan_id, "ready", actor)
        .await
        .unwrap();

    let loan = harness.workflow.back(loan_id, actor).await.unwrap();
    assert_eq!(loan.stage, LoanStage::Documentation.as_int());

    let history = harness.workflow.approval_history(loan_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, "withdrawn");
}

#[tokio::test]
#[ignore = "requires a Postgres database via DATABASE_URL"]
async fn at_most_one_pending_entry_per_stage() {
    let harness = loan_harness().await;
    let actor = Uuid::new_v4();
    let loan_id = loan_at_documentation(&harness).await;
    harness
        .workflow
        .submit(loan_id, "ready", actor)
        .await
        .unwrap();
    harness
        .workflow
        .review(loan_id, actor, Verdict::Approved, "ok")
        .await
        .unwrap();

    let history = harness.workflow.approval_history(loan_id).await.unwrap();
    let pending = history.iter().filter(|a| a.is_pending()).count();
    assert_eq!(pending, 1);
    assert_eq!(
        history.iter().find(|a| a.is_pending()).unwrap().stage,
        LoanStage::ManagerReview.as_int()
    );
}

#[tokio::test]
#[ignore = "requires a Postgres database via DATABASE_URL"]
async fn review_outside_the_review_band_is_a_state_error() {
    let harness = loan_harness().await;
    let actor = Uuid::new_v4();
    let loan = harness
        .workflow
        .create(loan_fields(&harness.refs), actor)
        .await
        .unwrap();

    let err = harness
        .workflow
        .review(loan.loan_id, actor, Verdict::Approved, "ok")
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::State(_)));
}

#[tokio::test]
#[ignore = "requires a Postgres database via DATABASE_URL"]
async fn only_draft_applications_are_deletable() {
    let harness = loan_harness().await;
    let actor = Uuid::new_v4();

    let draft = harness
        .workflow
        .create(loan_fields(&harness.refs), actor)
        .await
        .unwrap();
    harness.workflow.delete_draft(draft.loan_id).await.unwrap();
    assert!(matches!(
        harness.workflow.get(draft.loan_id).await.unwrap_err(),
        WorkflowError::NotFound(_)
    ));

    let submitted_id = loan_at_documentation(&harness).await;
    harness
        .workflow
        .submit(submitted_id, "ready", actor)
        .await
        .unwrap();
    assert!(matches!(
        harness.workflow.delete_draft(submitted_id).await.unwrap_err(),
        WorkflowError::State(_)
    ));
}

#[tokio::test]
#[ignore = "requires a Postgres database via DATABASE_URL"]
async fn unknown_guarantor_is_rejected_before_any_mutation() {
    let harness = loan_harness().await;
    let loan_id = loan_at_documentation(&harness).await;

    let err = harness
        .workflow
        .sync_guarantors(
            loan_id,
            LoanStage::Documentation.as_int(),
            vec![GuarantorSubmission {
                guarantor_id: Uuid::new_v4(),
                collateral: None,
            }],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::Validation { ref field, .. } if field == "guarantor_id"));
    assert!(harness.workflow.guarantors(loan_id).await.unwrap().is_empty());
}
