//! Applicant snapshot parsing and sanitization
//!
//! Requests arrive with a flat shape: a `customer_type` discriminator plus
//! both the individual and company name fields. The flat shape never travels
//! past validation; it is parsed into the tagged [`Applicant`] variant
//! immediately, and the non-selected branch is force-nulled server-side no
//! matter what the caller sent.

use serde::{Deserialize, Serialize};

use crate::error::{WorkflowError, WorkflowResult};

/// Flat request shape as submitted by the caller
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicantPayload {
    pub customer_type: String,
    pub first_name: Option<String>,
    pub other_names: Option<String>,
    pub surname: Option<String>,
    pub company_name: Option<String>,
}

/// Validated applicant snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "customer_type", rename_all = "snake_case")]
pub enum Applicant {
    Individual {
        first_name: String,
        other_names: Option<String>,
        surname: String,
    },
    Company {
        company_name: String,
    },
}

impl Applicant {
    /// Parse and sanitize a flat payload.
    ///
    /// Individual requires first name and surname; company requires the
    /// company name. Fields of the non-selected branch are discarded.
    pub fn parse(payload: &ApplicantPayload) -> WorkflowResult<Self> {
        match payload.customer_type.as_str() {
            "individual" => {
                let first_name = required(&payload.first_name, "first_name")?;
                let surname = required(&payload.surname, "surname")?;
                Ok(Applicant::Individual {
                    first_name,
                    other_names: trimmed(&payload.other_names),
                    surname,
                })
            }
            "company" => {
                let company_name = required(&payload.company_name, "company_name")?;
                Ok(Applicant::Company { company_name })
            }
            other => Err(WorkflowError::validation(
                "customer_type",
                format!("unknown customer type '{other}', expected individual or company"),
            )),
        }
    }

    /// Discriminator string persisted on the entity row
    pub fn customer_type(&self) -> &'static str {
        match self {
            Applicant::Individual { .. } => "individual",
            Applicant::Company { .. } => "company",
        }
    }

    /// Sanitized column values: (first_name, other_names, surname, company_name).
    /// Exactly one branch is populated, the other is null.
    pub fn columns(
        &self,
    ) -> (
        Option<&str>,
        Option<&str>,
        Option<&str>,
        Option<&str>,
    ) {
        match self {
            Applicant::Individual {
                first_name,
                other_names,
                surname,
            } => (
                Some(first_name.as_str()),
                other_names.as_deref(),
                Some(surname.as_str()),
                None,
            ),
            Applicant::Company { company_name } => {
                (None, None, None, Some(company_name.as_str()))
            }
        }
    }
}

fn required(value: &Option<String>, field: &str) -> WorkflowResult<String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(WorkflowError::validation(field, "field is required")),
    }
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
