//! Stage machines for loan and site workflows
//!
//! Each workflow type is a closed, ordered set of named stages mapped to the
//! integer persisted on the entity row. A stage belongs to exactly one phase:
//!
//! - `SelfService`: the applicant-facing band (draft, coordinating,
//!   documentation), advanced only by the linear `min(k+1, ceiling)` rule.
//! - `Review`: the formal approval chain, advanced only via the fixed
//!   transition table.
//! - `Terminal`: approved / rejected / history, no forward transitions.
//!
//! Both advance mechanisms write the same integer column, so the transition
//! table keys stay numerically aligned with the linear band. The phase tag
//! keeps the two algorithms from being cross-applied.

use serde::{Deserialize, Serialize};

/// Which transition rules apply at a given stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Applicant-facing band: linear advance only
    SelfService,
    /// Formal approval chain: transition table only
    Review,
    /// No forward transitions
    Terminal,
}

/// Common behavior of a workflow's stage set
pub trait StageMachine: Copy + Eq + std::fmt::Debug + Send + Sync + 'static {
    /// Highest stage reachable by linear self-service advance
    const SELF_SERVICE_CEILING: Self;
    /// Stage entered by `submit`
    const FIRST_REVIEW: Self;
    /// Terminal stage entered on a rejected review verdict
    const REJECTED: Self;

    fn from_int(value: i32) -> Option<Self>;
    fn as_int(self) -> i32;
    fn phase(self) -> Phase;

    /// Next stage in the review chain; `None` outside it
    fn next_review(self) -> Option<Self>;

    fn is_review(self) -> bool {
        self.phase() == Phase::Review
    }

    fn is_terminal(self) -> bool {
        self.phase() == Phase::Terminal
    }

    /// Linear self-service advance: one step forward, capped at the ceiling
    fn linear_next(self) -> Self {
        let capped = (self.as_int() + 1).min(Self::SELF_SERVICE_CEILING.as_int());
        Self::from_int(capped).unwrap_or(Self::SELF_SERVICE_CEILING)
    }

    /// Single-step regression; `None` at the floor
    fn previous(self) -> Option<Self> {
        Self::from_int(self.as_int() - 1)
    }
}

/// Stages of the loan application workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStage {
    Draft,
    Documentation,
    OfficerReview,
    ManagerReview,
    CommitteeReview,
    Approved,
    Rejected,
}

impl StageMachine for LoanStage {
    const SELF_SERVICE_CEILING: Self = LoanStage::Documentation;
    const FIRST_REVIEW: Self = LoanStage::OfficerReview;
    const REJECTED: Self = LoanStage::Rejected;

    fn from_int(value: i32) -> Option<Self> {
        match value {
            1 => Some(LoanStage::Draft),
            2 => Some(LoanStage::Documentation),
            3 => Some(LoanStage::OfficerReview),
            4 => Some(LoanStage::ManagerReview),
            5 => Some(LoanStage::CommitteeReview),
            6 => Some(LoanStage::Approved),
            7 => Some(LoanStage::Rejected),
            _ => None,
        }
    }

    fn as_int(self) -> i32 {
        match self {
            LoanStage::Draft => 1,
            LoanStage::Documentation => 2,
            LoanStage::OfficerReview => 3,
            LoanStage::ManagerReview => 4,
            LoanStage::CommitteeReview => 5,
            LoanStage::Approved => 6,
            LoanStage::Rejected => 7,
        }
    }

    fn phase(self) -> Phase {
        match self {
            LoanStage::Draft | LoanStage::Documentation => Phase::SelfService,
            LoanStage::OfficerReview | LoanStage::ManagerReview | LoanStage::CommitteeReview => {
                Phase::Review
            }
            LoanStage::Approved | LoanStage::Rejected => Phase::Terminal,
        }
    }

    fn next_review(self) -> Option<Self> {
        match self {
            LoanStage::OfficerReview => Some(LoanStage::ManagerReview),
            LoanStage::ManagerReview => Some(LoanStage::CommitteeReview),
            LoanStage::CommitteeReview => Some(LoanStage::Approved),
            _ => None,
        }
    }
}

/// Stages of the land-site application workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteStage {
    Draft,
    Coordinating,
    Documentation,
    OfficerReview,
    ManagerReview,
    CommitteeReview,
    Approved,
    History,
    Rejected,
}

impl StageMachine for SiteStage {
    const SELF_SERVICE_CEILING: Self = SiteStage::Documentation;
    const FIRST_REVIEW: Self = SiteStage::OfficerReview;
    const REJECTED: Self = SiteStage::Rejected;

    fn from_int(value: i32) -> Option<Self> {
        match value {
            1 => Some(SiteStage::Draft),
            2 => Some(SiteStage::Coordinating),
            3 => Some(SiteStage::Documentation),
            4 => Some(SiteStage::OfficerReview),
            5 => Some(SiteStage::ManagerReview),
            6 => Some(SiteStage::CommitteeReview),
            7 => Some(SiteStage::Approved),
            8 => Some(SiteStage::History),
            9 => Some(SiteStage::Rejected),
            _ => None,
        }
    }

    fn as_int(self) -> i32 {
        match self {
            SiteStage::Draft => 1,
            SiteStage::Coordinating => 2,
            SiteStage::Documentation => 3,
            SiteStage::OfficerReview => 4,
            SiteStage::ManagerReview => 5,
            SiteStage::CommitteeReview => 6,
            SiteStage::Approved => 7,
            SiteStage::History => 8,
            SiteStage::Rejected => 9,
        }
    }

    fn phase(self) -> Phase {
        match self {
            SiteStage::Draft | SiteStage::Coordinating | SiteStage::Documentation => {
                Phase::SelfService
            }
            SiteStage::OfficerReview | SiteStage::ManagerReview | SiteStage::CommitteeReview => {
                Phase::Review
            }
            SiteStage::Approved | SiteStage::History | SiteStage::Rejected => Phase::Terminal,
        }
    }

    fn next_review(self) -> Option<Self> {
        match self {
            SiteStage::OfficerReview => Some(SiteStage::ManagerReview),
            SiteStage::ManagerReview => Some(SiteStage::CommitteeReview),
            SiteStage::CommitteeReview => Some(SiteStage::Approved),
            _ => None,
        }
    }
}

/// Which workflow an approval ledger entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Loan,
    Site,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Loan => "loan",
            EntityKind::Site => "site",
        }
    }
}
