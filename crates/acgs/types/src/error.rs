//! The governance fault taxonomy shared by every pipeline stage.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::principle::PrincipleId;
use crate::report::TierName;
use crate::rule::RuleId;

/// Classified failure of synthesis, validation, recovery or enforcement.
///
/// Faults are data: they are carried in escalation packets and audit
/// records, not only returned as errors.
#[derive(Clone, Debug, PartialEq, Error, Serialize, Deserialize)]
pub enum GovernanceFault {
    #[error("oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("synthesis output malformed: {0}")]
    SynthesisMalformed(String),

    #[error("validation tier {tier} failed: {detail}")]
    ValidationTierFailure { tier: TierName, detail: String },

    #[error("conflict unresolved between {first} and {second}")]
    ConflictUnresolved { first: RuleId, second: RuleId },

    #[error("formal verification disproved rule: {0}")]
    FormalVerificationDisproved(String),

    /// Non-fatal: treated as an inapplicable verification.
    #[error("formal verification timed out after {0}ms")]
    FormalVerificationTimeout(u64),

    /// Resolved to a fail-safe deny; never surfaced to the upstream caller.
    #[error("enforcement exceeded latency ceiling of {0}ms")]
    EnforcementTimeout(u64),

    #[error("recovery budget exhausted for {principle_id} after {attempts} attempts")]
    RecoveryBudgetExhausted {
        principle_id: PrincipleId,
        attempts: u32,
    },
}

impl GovernanceFault {
    /// Whether the fault stops the current attempt.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::FormalVerificationTimeout(_) | Self::EnforcementTimeout(_)
        )
    }

    /// Whether this fault must reach a human reviewer.
    pub fn requires_escalation(&self) -> bool {
        matches!(
            self,
            Self::RecoveryBudgetExhausted { .. } | Self::ConflictUnresolved { .. }
        )
    }
}
