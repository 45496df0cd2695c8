//! Land-site persistence
//!
//! Row-level operations for site applications, their investor links and
//! boundary coordinates.

use sqlx::{PgConnection, PgPool};
use tracing::info;
use uuid::Uuid;

use crate::applicant::Applicant;
use crate::blob_store::StoredFile;
use crate::error::WorkflowResult;
use crate::models::{
    CoordinateRow, CoordinateSubmission, InvestorLinkRow, SiteApplicationFields, SiteRow,
};

const SITE_COLUMNS: &str = "site_id, customer_type, first_name, other_names, surname, \
     company_name, sector_id, branch_id, application_path, application_name, stage, \
     submit_remarks, remarks, created_by, created_at, updated_at";

#[derive(Clone, Debug)]
pub struct SiteService {
    pool: PgPool,
}

impl SiteService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        applicant: &Applicant,
        fields: &SiteApplicationFields,
        application: Option<&StoredFile>,
        stage: i32,
        created_by: Uuid,
    ) -> WorkflowResult<SiteRow> {
        let site_id = Uuid::new_v4();
        let (first_name, other_names, surname, company_name) = applicant.columns();

        let row = sqlx::query_as::<_, SiteRow>(&format!(
            r#"
            INSERT INTO sites
                (site_id, customer_type, first_name, other_names, surname, company_name,
                 sector_id, branch_id, application_path, application_name, stage,
                 created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW(), NOW())
            RETURNING {SITE_COLUMNS}
            "#
        ))
        .bind(site_id)
        .bind(applicant.customer_type())
        .bind(first_name)
        .bind(other_names)
        .bind(surname)
        .bind(company_name)
        .bind(fields.sector_id)
        .bind(fields.branch_id)
        .bind(application.map(|f| f.path.as_str()))
        .bind(application.map(|f| f.display_name.as_str()))
        .bind(stage)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await?;

        info!("Created site application {}", site_id);
        Ok(row)
    }

    pub async fn get(&self, site_id: Uuid) -> WorkflowResult<Option<SiteRow>> {
        let row = sqlx::query_as::<_, SiteRow>(&format!(
            "SELECT {SITE_COLUMNS} FROM sites WHERE site_id = $1"
        ))
        .bind(site_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn get_for_update(
        &self,
        conn: &mut PgConnection,
        site_id: Uuid,
    ) -> WorkflowResult<Option<SiteRow>> {
        let row = sqlx::query_as::<_, SiteRow>(&format!(
            "SELECT {SITE_COLUMNS} FROM sites WHERE site_id = $1 FOR UPDATE"
        ))
        .bind(site_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row)
    }

    pub async fn list_by_stage(&self, stage: i32) -> WorkflowResult<Vec<SiteRow>> {
        let rows = sqlx::query_as::<_, SiteRow>(&format!(
            "SELECT {SITE_COLUMNS} FROM sites WHERE stage = $1 ORDER BY created_at DESC"
        ))
        .bind(stage)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn update_application(
        &self,
        conn: &mut PgConnection,
        site_id: Uuid,
        applicant: &Applicant,
        fields: &SiteApplicationFields,
        application: Option<&StoredFile>,
        stage: i32,
    ) -> WorkflowResult<SiteRow> {
        let (first_name, other_names, surname, company_name) = applicant.columns();

        let row = sqlx::query_as::<_, SiteRow>(&format!(
            r#"
            UPDATE sites
            SET customer_type = $2, first_name = $3, other_names = $4, surname = $5,
                company_name = $6, sector_id = $7, branch_id = $8,
                application_path = COALESCE($9, application_path),
                application_name = COALESCE($10, application_name),
                stage = $11, updated_at = NOW()
            WHERE site_id = $1
            RETURNING {SITE_COLUMNS}
            "#
        ))
        .bind(site_id)
        .bind(applicant.customer_type())
        .bind(first_name)
        .bind(other_names)
        .bind(surname)
        .bind(company_name)
        .bind(fields.sector_id)
        .bind(fields.branch_id)
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
        site_id: Uuid,
        stage: i32,
    ) -> WorkflowResult<()> {
        sqlx::query("UPDATE sites SET stage = $2, updated_at = NOW() WHERE site_id = $1")
            .bind(site_id)
            .bind(stage)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn set_submitted(
        &self,
        conn: &mut PgConnection,
        site_id: Uuid,
        stage: i32,
        submit_remarks: &str,
    ) -> WorkflowResult<()> {
        sqlx::query(
            r#"
            UPDATE sites
            SET stage = $2, submit_remarks = $3, updated_at = NOW()
            WHERE site_id = $1
            "#,
        )
        .bind(site_id)
        .bind(stage)
        .bind(submit_remarks)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, conn: &mut PgConnection, site_id: Uuid) -> WorkflowResult<u64> {
        let result = sqlx::query("DELETE FROM sites WHERE site_id = $1")
            .bind(site_id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    // ==========================================
    // INVESTOR LINKS
    // ==========================================

    pub async fn list_investors(&self, site_id: Uuid) -> WorkflowResult<Vec<InvestorLinkRow>> {
        let rows = sqlx::query_as::<_, InvestorLinkRow>(
            r#"
            SELECT link_id, site_id, investor_id, collateral_path, collateral_name, created_at
            FROM site_investors
            WHERE site_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(site_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn insert_investor(
        &self,
        conn: &mut PgConnection,
        site_id: Uuid,
        investor_id: Uuid,
        collateral: Option<&StoredFile>,
    ) -> WorkflowResult<Uuid> {
        let link_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO site_investors
                (link_id, site_id, investor_id, collateral_path, collateral_name, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            "#,
        )
        .bind(link_id)
        .bind(site_id)
        .bind(investor_id)
        .bind(collateral.map(|f| f.path.as_str()))
        .bind(collateral.map(|f| f.display_name.as_str()))
        .execute(&mut *conn)
        .await?;

        Ok(link_id)
    }

    pub async fn update_investor_collateral(
        &self,
        conn: &mut PgConnection,
        link_id: Uuid,
        collateral: &StoredFile,
    ) -> WorkflowResult<()> {
        sqlx::query(
            r#"
            UPDATE site_investors
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

    pub async fn delete_investor_link(
        &self,
        conn: &mut PgConnection,
        link_id: Uuid,
    ) -> WorkflowResult<()> {
        sqlx::query("DELETE FROM site_investors WHERE link_id = $1")
            .bind(link_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn delete_all_investors(
        &self,
        conn: &mut PgConnection,
        site_id: Uuid,
    ) -> WorkflowResult<Vec<String>> {
        let paths: Vec<(Option<String>,)> = sqlx::query_as(
            "DELETE FROM site_investors WHERE site_id = $1 RETURNING collateral_path",
        )
        .bind(site_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(paths.into_iter().filter_map(|(p,)| p).collect())
    }

    // ==========================================
    // BOUNDARY COORDINATES
    // ==========================================

    pub async fn list_coordinates(&self, site_id: Uuid) -> WorkflowResult<Vec<CoordinateRow>> {
        let rows = sqlx::query_as::<_, CoordinateRow>(
            r#"
            SELECT coordinate_id, site_id, latitude, longitude
            FROM site_coordinates
            WHERE site_id = $1
            ORDER BY coordinate_id ASC
            "#,
        )
        .bind(site_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn insert_coordinate(
        &self,
        conn: &mut PgConnection,
        site_id: Uuid,
        coordinate: &CoordinateSubmission,
    ) -> WorkflowResult<Uuid> {
        let coordinate_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO site_coordinates (coordinate_id, site_id, latitude, longitude)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(coordinate_id)
        .bind(site_id)
        .bind(coordinate.latitude)
        .bind(coordinate.longitude)
        .execute(&mut *conn)
        .await?;

        Ok(coordinate_id)
    }

    pub async fn delete_coordinate(
        &self,
        conn: &mut PgConnection,
        coordinate_id: Uuid,
    ) -> WorkflowResult<()> {
        sqlx::query("DELETE FROM site_coordinates WHERE coordinate_id = $1")
            .bind(coordinate_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn delete_all_coordinates(
        &self,
        conn: &mut PgConnection,
        site_id: Uuid,
    ) -> WorkflowResult<u64> {
        let result = sqlx::query("DELETE FROM site_coordinates WHERE site_id = $1")
            .bind(site_id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }
}
