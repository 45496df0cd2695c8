//! Loan application rows and request fields

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::applicant::ApplicantPayload;
use crate::blob_store::FileUpload;

/// Loan application record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LoanRow {
    pub loan_id: Uuid,
    pub customer_type: String,
    pub first_name: Option<String>,
    pub other_names: Option<String>,
    pub surname: Option<String>,
    pub company_name: Option<String>,
    pub package_id: Uuid,
    pub branch_id: Uuid,
    pub loan_amount: Decimal,
    pub loan_duration: i32,
    pub interest_rate: Decimal,
    /// Persisted as provided by the caller; the interest formula is the
    /// caller's, not enforced server-side.
    pub interest_amount: Decimal,
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
pub struct LoanApplicationFields {
    pub applicant: ApplicantPayload,
    pub package_id: Uuid,
    pub branch_id: Uuid,
    pub loan_amount: Decimal,
    pub loan_duration: i32,
    pub interest_rate: Decimal,
    pub interest_amount: Decimal,
    /// Optional application form document; replaces any prior one
    pub application_file: Option<FileUpload>,
}

/// One guarantor attachment as submitted in a documentation sync.
/// `collateral` is `None` when the link is resubmitted without a new file.
#[derive(Debug, Clone)]
pub struct GuarantorSubmission {
    pub guarantor_id: Uuid,
    pub collateral: Option<FileUpload>,
}

/// Guarantor link attached to a loan
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GuarantorLinkRow {
    pub link_id: Uuid,
    pub loan_id: Uuid,
    pub guarantor_id: Uuid,
    pub collateral_path: Option<String>,
    pub collateral_name: Option<String>,
    pub created_at: DateTime<Utc>,
}
