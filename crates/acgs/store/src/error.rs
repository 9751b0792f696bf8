use acgs_types::{PrincipleId, RuleId};
use thiserror::Error;

/// Errors from the principle store, the active rule set and audit sinks.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("principle not found: {0}")]
    PrincipleNotFound(PrincipleId),

    #[error("principle already exists: {0}")]
    DuplicatePrinciple(PrincipleId),

    #[error("principle retired: {0}")]
    PrincipleRetired(PrincipleId),

    #[error("stale principle revision for {principle_id}: expected {expected}, current {current}")]
    StaleRevision {
        principle_id: PrincipleId,
        expected: u32,
        current: u32,
    },

    #[error("rule not found: {0}")]
    RuleNotFound(RuleId),

    #[error("rule body does not compile: {0}")]
    Compile(String),

    #[error("audit I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
