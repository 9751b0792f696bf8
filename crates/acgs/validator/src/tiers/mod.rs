//! The six validation tiers. Each tier is a function producing one
//! [`TierOutcome`]; ordering and short-circuiting live in the validator.

use std::time::Instant;

use acgs_types::{TierFindings, TierName, TierOutcome};

pub mod bias;
pub mod conflict;
pub mod formal;
pub mod safety;
pub mod semantic;
pub mod syntax;

pub(crate) fn outcome(
    tier: TierName,
    passed: bool,
    mandatory: bool,
    detail: impl Into<String>,
    started: Instant,
    findings: TierFindings,
) -> TierOutcome {
    TierOutcome {
        tier,
        passed,
        mandatory,
        detail: detail.into(),
        duration_us: started.elapsed().as_micros().min(u64::MAX as u128) as u64,
        findings,
    }
}
