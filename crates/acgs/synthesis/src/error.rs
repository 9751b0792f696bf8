use acgs_types::{GovernanceFault, PrincipleId};

/// Errors from rule synthesis.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("principle {principle_id} cannot be synthesized: {reason}")]
    InvalidPrinciple {
        principle_id: PrincipleId,
        reason: String,
    },
    #[error("oracle {oracle} failed: {detail}")]
    Oracle { oracle: String, detail: String },
    #[error("oracle {oracle} timed out after {timeout_ms}ms")]
    OracleTimeout { oracle: String, timeout_ms: u64 },
    #[error("no oracle produced a rule: {0}")]
    OracleUnavailable(String),
    #[error("oracle transport error: {0}")]
    Transport(String),
    #[error("synthesis cancelled for {0}")]
    Cancelled(PrincipleId),
}

impl SynthesisError {
    /// The governance fault this error is reported as.
    pub fn fault(&self) -> Option<GovernanceFault> {
        match self {
            Self::Oracle { .. }
            | Self::OracleTimeout { .. }
            | Self::OracleUnavailable(_)
            | Self::Transport(_) => Some(GovernanceFault::OracleUnavailable(self.to_string())),
            Self::InvalidPrinciple { .. } | Self::Cancelled(_) => None,
        }
    }
}
