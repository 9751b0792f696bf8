#![deny(unsafe_code)]
//! # acgs-types
//!
//! Shared data model for the constitutional governance layer: principles and
//! their scenarios, candidate and active rule metadata, validation reports,
//! enforcement decisions, and the [`GovernanceFault`] taxonomy.

pub mod decision;
pub mod error;
pub mod hash;
pub mod principle;
pub mod report;
pub mod rule;

pub use decision::{EnforcementDecision, FailSafeReason, Proposal, RuntimeConflict, Violation};
pub use error::GovernanceFault;
pub use hash::{ContentHash, ContentHashError};
pub use principle::{Formalizability, Principle, PrincipleId, PrincipleStatus, Scenario};
pub use report::{
    BiasBand, ConflictKind, ConflictRecord, ConflictResolution, SafetyFinding, SafetyFindingKind,
    TierFindings, TierName, TierOutcome, ValidationReport,
};
pub use rule::{
    CandidateRule, EnforcementMode, HumanApproval, PromotionBasis, RuleId, ValidationStatus,
    Verdict, VerificationOutcome,
};
