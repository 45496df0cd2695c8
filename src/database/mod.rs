//! Parameterized persistence services
//!
//! Plain `PgPool`-holding services in the repository style: reads run on the
//! pool, workflow-critical writes take a `PgConnection` so the transition
//! services can compose them inside one transaction.

pub mod approval_service;
pub mod loan_service;
pub mod reference_service;
pub mod site_service;

pub use approval_service::ApprovalService;
pub use loan_service::LoanService;
pub use reference_service::ReferenceService;
pub use site_service::SiteService;
