//! Loan persistence
//!
//! Row-level operations for loan applications and their guarantor links.
//! Stage arithmetic lives in the workflow layer; this service only writes
//! what it is told.

use sqlx::{PgConnection, PgPool};
use tracing::info;
use uuid::Uuid;

use crate::applicant::Applicant;
use crate::blob_store::StoredFile;
use crate::error::WorkflowResult;
use crate::models::{GuarantorLinkRow, LoanApplicationFields, LoanRow};

const LOAN_COLUMNS: &str = "loan_id, customer_type, first_name, other_names, surname, \
     company_name, package_id, branch_id, loan_amount, loan_duration, interest_rate, \
     interest_amount, application_path, application_name, stage, submit_remarks, remarks, \
     created_by, created_at, updated_at";

#[derive(Clone, Debug)]
pub struct LoanService {
    pool: PgPool,
}

impl LoanService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new application at the given stage
    pub async fn insert(
        &self,
        applicant: &Applicant,
        fields: &LoanApplicationFields,
        application: Option<&StoredFile>,
        stage: i32,
        created_by: Uuid,
    ) -> WorkflowResult<LoanRow> {
        let loan_id = Uuid::new_v4();
        let (first_name, other_names, surname, company_name) = applicant.columns();

        let row = sqlx::query_as::<_, LoanRow>(&format!(
            r#"
            INSERT INTO loans
                (loan_id, customer_type, first_name, other_names, surname, company_name,
                 package_id, branch_id, loan_amount, loan_duration, interest_rate,
                 interest_amount, application_path, application_name, stage,
                 created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    $16, NOW(), NOW())
            RETURNING {LOAN_COLUMNS}
            "#
        ))
        .bind(loan_id)
        .bind(applicant.customer_type())
        .bind(first_name)
        .bind(other_names)
        .bind(surname)
        .bind(company_name)
        .bind(fields.package_id)
        .bind(fields.branch_id)
        .bind(fields.loan_amount)
        .bind(fields.loan_duration)
        .bind(fields.interest_rate)
        .bind(fields.interest_amount)
        .bind(application.map(|f| f.path.as_str()))
        .bind(application.map(|f| f.display_name.as_str()))
        .bind(stage)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await?;

        info!("Created loan application {}", loan_id);
        Ok(row)
    }

    pub async fn get(&self, loan_id: Uuid) -> WorkflowResult<Option<LoanRow>> {
        let row = sqlx::query_as::<_, LoanRow>(&format!(
            "SELECT {LOAN_COLUMNS} FROM loans WHERE loan_id = $1"
        ))
        .bind(loan_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Load and row-lock inside the caller's transaction
    pub async fn get_for_update(
        &self,
        conn: &mut PgConnection,
        loan_id: Uuid,
    ) -> WorkflowResult<Option<LoanRow>> {
        let row = sqlx::query_as::<_, LoanRow>(&format!(
            "SELECT {LOAN_COLUMNS} FROM loans WHERE loan_id = $1 FOR UPDATE"
        ))
        .bind(loan_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row)
    }

    pub async fn list_by_stage(&self, stage: i32) -> WorkflowResult<Vec<LoanRow>> {
        let rows = sqlx::query_as::<_, LoanRow>(&format!(
            "SELECT {LOAN_COLUMNS} FROM loans WHERE stage = $1 ORDER BY created_at DESC"
        ))
        .bind(stage)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Rewrite the applicant snapshot and loan terms, moving to `stage`.
    /// Application document columns change only when a new file was stored.
    pub async fn update_application(
        &self,
        conn: &mut PgConnection,
        loan_id: Uuid,
        applicant: &Applicant,
        fields: &LoanApplicationFields,
        application: Option<&StoredFile>,
        stage: i32,
    ) -> WorkflowResult<LoanRow> {
        let (first_name, other_names, surname, company_name) = applicant.columns();

        let row = sqlx::query_as::<_, LoanRow>(&format!(
            r#"
            UPDATE loans
            SET customer_type = $2, first_name = $3, other_names = $4, surname = $5,
                company_name = $6, package_id = $7, branch_id = $8, loan_amount = $9,
                loan_duration = $10, interest_rate = $11, interest_amount = $12,
                application_path = COALESCE($13, application_path),
                application_name = COALESCE($14, application_name),
                stage = $15, updated_at = NOW()
            WHERE loan_id = $1
            RETURNING {LOAN_COLUMNS}
            "#
        ))
        .bind(loan_id)
        .bind(applicant.customer_type())
        .bind(first_name)
        .bind(other_names)
        .bind(surname)
        .bind(company_name)
        .bind(fields.package_id)
        .bind(fields.branch_id)
        .bind(fields.loan_amount)
        .bind(fields.loan_duration)
        .bind(fields.interest_rate)
        .bind(fields.interest_amount)
        .bind(application.map(|f| f.path.as_str()))
        .bind(application.map(|f| f.display_name.as_str()))
        .bind(stage)
        .fetch_one(&mut *conn)
        .await?;

        Ok(row)
    }

    pub async fn set_stage(
        &self,
        conn: &mut PgConnection,
        loan_id: Uuid,
        stage: i32,
    ) -> WorkflowResult<()> {
        sqlx::query("UPDATE loans SET stage = $2, updated_at = NOW() WHERE loan_id = $1")
            .bind(loan_id)
            .bind(stage)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn set_submitted(
        &self,
        conn: &mut PgConnection,
        loan_id: Uuid,
        stage: i32,
        submit_remarks: &str,
    ) -> WorkflowResult<()> {
        sqlx::query(
            r#"
            UPDATE loans
            SET stage = $2, submit_remarks = $3, updated_at = NOW()
            WHERE loan_id = $1
            "#,
        )
        .bind(loan_id)
        .bind(stage)
        .bind(submit_remarks)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, conn: &mut PgConnection, loan_id: Uuid) -> WorkflowResult<u64> {
        let result = sqlx::query("DELETE FROM loans WHERE loan_id = $1")
            .bind(loan_id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    // ==========================================
    // GUARANTOR LINKS
    // ==========================================

    pub async fn list_guarantors(&self, loan_id: Uuid) -> WorkflowResult<Vec<GuarantorLinkRow>> {
        let rows = sqlx::query_as::<_, GuarantorLinkRow>(
            r#"
            SELECT link_id, loan_id, guarantor_id, collateral_path, collateral_name, created_at
            FROM loan_guarantors
            WHERE loan_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(loan_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn insert_guarantor(
        &self,
        conn: &mut PgConnection,
        loan_id: Uuid,
        guarantor_id: Uuid,
        collateral: Option<&StoredFile>,
    ) -> WorkflowResult<Uuid> {
        let link_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO loan_guarantors
                (link_id, loan_id, guarantor_id, collateral_path, collateral_name, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            "#,
        )
        .bind(link_id)
        .bind(loan_id)
        .bind(guarantor_id)
        .bind(collateral.map(|f| f.path.as_str()))
        .bind(collateral.map(|f| f.display_name.as_str()))
        .execute(&mut *conn)
        .await?;

        Ok(link_id)
    }

    pub async fn update_guarantor_collateral(
        &self,
        conn: &mut PgConnection,
        link_id: Uuid,
        collateral: &StoredFile,
    ) -> WorkflowResult<()> {
        sqlx::query(
            r#"
            UPDATE loan_guarantors
            SET collateral_path = $2, collateral_name = $3
            WHERE link_id = $1
            "#,
        )
        .bind(link_id)
        .bind(&collateral.path)
        .bind(&collateral.display_name)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn delete_guarantor_link(
        &self,
        conn: &mut PgConnection,
        link_id: Uuid,
    ) -> WorkflowResult<()> {
        sqlx::query("DELETE FROM loan_guarantors WHERE link_id = $1")
            .bind(link_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Delete all guarantor links for a loan, returning any collateral
    /// paths for after-commit cleanup
    pub async fn delete_all_guarantors(
        &self,
        conn: &mut PgConnection,
        loan_id: Uuid,
    ) -> WorkflowResult<Vec<String>> {
        let paths: Vec<(Option<String>,)> = sqlx::query_as(
            "DELETE FROM loan_guarantors WHERE loan_id = $1 RETURNING collateral_path",
        )
        .bind(loan_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(paths.into_iter().filter_map(|(p,)| p).collect())
    }
}
