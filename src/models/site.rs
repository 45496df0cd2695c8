//! Land-site application rows and request fields

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::applicant::ApplicantPayload;
use crate::blob_store::FileUpload;
use crate::error::{WorkflowError, WorkflowResult};

/// Land-site application record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SiteRow {
    pub site_id: Uuid,
    pub customer_type: String,
    pub first_name: Option<String>,
    pub other_names: Option<String>,
    pub surname: Option<String>,
    pub company_name: Option<String>,
    pub sector_id: Uuid,
    pub branch_id: Uuid,
    pub application_path: Option<String>,
    pub application_name: Option<String>,
    pub stage: i32,
    pub submit_remarks: Option<String>,
    pub remarks: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields captured by the applicant-facing create and update forms
#[derive(Debug, Clone)]
pub struct SiteApplicationFields {
    pub applicant: ApplicantPayload,
    pub sector_id: Uuid,
    pub branch_id: Uuid,
    /// Optional application form document; replaces any prior one
    pub application_file: Option<FileUpload>,
}

/// One investor attachment as submitted in a documentation sync
#[derive(Debug, Clone)]
pub struct InvestorSubmission {
    pub investor_id: Uuid,
    pub collateral: Option<FileUpload>,
}

/// Investor link attached to a site
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InvestorLinkRow {
    pub link_id: Uuid,
    pub site_id: Uuid,
    pub investor_id: Uuid,
    pub collateral_path: Option<String>,
    pub collateral_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One boundary coordinate as submitted in a coordinating sync
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinateSubmission {
    pub latitude: f64,
    pub longitude: f64,
}

impl CoordinateSubmission {
    /// Coordinates must be finite and inside the WGS84 ranges.
    pub fn validate(&self) -> WorkflowResult<()> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(WorkflowError::validation(
                "latitude",
                format!("'{}' is not a valid latitude", self.latitude),
            ));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(WorkflowError::validation(
                "longitude",
                format!("'{}' is not a valid longitude", self.longitude),
            ));
        }
        Ok(())
    }

    /// Diff key: coordinates have no surrogate identity of their own, so
    /// membership is keyed by the value pair (micro-degree precision).
    pub fn key(&self) -> (i64, i64) {
        (
            (self.latitude * 1e6).round() as i64,
            (self.longitude * 1e6).round() as i64,
        )
    }
}

/// Boundary coordinate attached to a site
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CoordinateRow {
    pub coordinate_id: Uuid,
    pub site_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
}

impl CoordinateRow {
    pub fn key(&self) -> (i64, i64) {
        CoordinateSubmission {
            latitude: self.latitude,
            longitude: self.longitude,
        }
        .key()
    }
}
