use acgs_types::RuleId;
use acgs_validator::ValidatorError;
use uuid::Uuid;

/// Errors from recovery and human review.
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    #[error("escalation not found: {0}")]
    EscalationNotFound(Uuid),

    #[error("escalation {0} already decided")]
    AlreadyDecided(Uuid),

    #[error("rule {rule_id} was not attempted in escalation {packet}")]
    RuleNotInPacket { packet: Uuid, rule_id: RuleId },

    #[error("cannot decompose principle: {0}")]
    Decompose(String),

    #[error("cannot recombine sub-rules: {0}")]
    Recombine(String),

    #[error("invalid recovery configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Validator(#[from] ValidatorError),
}
