//! Persisted row types and request field structs

pub mod approval;
pub mod loan;
pub mod site;

pub use approval::{ApprovalRow, ApprovalStatus, Verdict};
pub use loan::{GuarantorLinkRow, GuarantorSubmission, LoanApplicationFields, LoanRow};
pub use site::{
    CoordinateRow, CoordinateSubmission, InvestorLinkRow, InvestorSubmission,
    SiteApplicationFields, SiteRow,
};
