//! Workflow configuration

use serde::{Deserialize, Serialize};

/// Configuration for the workflow services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Blob-store folder for loan application forms
    pub loan_application_folder: String,
    /// Blob-store folder for loan guarantor collateral documents
    pub loan_collateral_folder: String,
    /// Blob-store folder for site application forms
    pub site_application_folder: String,
    /// Blob-store folder for site investor collateral documents
    pub site_collateral_folder: String,
    /// Maximum number of dependent-collection items accepted per sync
    pub max_items_per_sync: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            loan_application_folder: "loans/applications".to_string(),
            loan_collateral_folder: "loans/collateral".to_string(),
            site_application_folder: "sites/applications".to_string(),
            site_collateral_folder: "sites/collateral".to_string(),
            max_items_per_sync: 100,
        }
    }
}
