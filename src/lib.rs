//! Stage and approval workflow engine for land-site and loan applications
//!
//! Applications move through a fixed pipeline (draft, documentation, then
//! officer, manager and committee review, ending approved, with a
//! rejected/history terminal band), with one approval ledger entry per
//! entity/stage/approver and dependent child records (guarantors,
//! investors, boundary coordinates, collateral documents) kept in sync with
//! the current stage.
//!
//! The applicant-facing band advances linearly (`min(stage + 1, ceiling)`);
//! once submitted, the record moves only through the named review chain.
//! All row writes for a transition happen inside one transaction; blob
//! store cleanup is an after-commit, best-effort side effect.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use landloan_workflow::assignee::SelfAssign;
//! use landloan_workflow::blob_store::LocalBlobStore;
//! use landloan_workflow::config::WorkflowConfig;
//! use landloan_workflow::workflow::LoanWorkflow;
//!
//! # async fn demo(pool: sqlx::PgPool) {
//! let workflow = LoanWorkflow::new(
//!     pool,
//!     Arc::new(LocalBlobStore::new("/var/lib/landloan/blobs")),
//!     Arc::new(SelfAssign),
//!     WorkflowConfig::default(),
//! );
//! # let _ = workflow;
//! # }
//! ```

pub mod applicant;
pub mod assignee;
pub mod blob_store;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod stage;
pub mod workflow;

pub use applicant::{Applicant, ApplicantPayload};
pub use assignee::{AssigneeResolver, SelfAssign};
pub use blob_store::{BlobStore, FileUpload, InMemoryBlobStore, LocalBlobStore, StoredFile};
pub use config::WorkflowConfig;
pub use error::{WorkflowError, WorkflowResult};
pub use stage::{EntityKind, LoanStage, Phase, SiteStage, StageMachine};
pub use workflow::{LoanWorkflow, SiteWorkflow};
