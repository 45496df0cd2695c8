//! Reference-data existence checks
//!
//! Packages, sectors, branches and the reusable party records (guarantors,
//! investors) are immutable reference data owned elsewhere. The workflow
//! only needs opaque valid/invalid checks before accepting a foreign key.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::WorkflowResult;

#[derive(Clone, Debug)]
pub struct ReferenceService {
    pool: PgPool,
}

impl ReferenceService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn exists(&self, table: &str, id_column: &str, id: Uuid) -> WorkflowResult<bool> {
        // Table and column names come from the fixed match arms below,
        // never from caller input.
        let sql = format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE {id_column} = $1)");
        let (found,): (bool,) = sqlx::query_as(&sql).bind(id).fetch_one(&self.pool).await?;
        Ok(found)
    }

    pub async fn package_exists(&self, package_id: Uuid) -> WorkflowResult<bool> {
        self.exists("packages", "package_id", package_id).await
    }

    pub async fn sector_exists(&self, sector_id: Uuid) -> WorkflowResult<bool> {
        self.exists("sectors", "sector_id", sector_id).await
    }

    pub async fn branch_exists(&self, branch_id: Uuid) -> WorkflowResult<bool> {
        self.exists("branches", "branch_id", branch_id).await
    }

    pub async fn guarantor_exists(&self, guarantor_id: Uuid) -> WorkflowResult<bool> {
        self.exists("guarantors", "guarantor_id", guarantor_id).await
    }

    pub async fn investor_exists(&self, investor_id: Uuid) -> WorkflowResult<bool> {
        self.exists("investors", "investor_id", investor_id).await
    }
}
