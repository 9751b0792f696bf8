use acgs_enforcement::EnforcementError;
use acgs_fidelity::FidelityError;
use acgs_recovery::RecoveryError;
use acgs_store::StoreError;
use acgs_synthesis::SynthesisError;
use acgs_validator::ValidatorError;

/// Errors from loading or validating a [`GovernanceConfig`](crate::GovernanceConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(String),
    #[error("invalid {section} configuration: {detail}")]
    Invalid { section: &'static str, detail: String },
}

/// Errors from the governance pipeline.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
    #[error(transparent)]
    Validator(#[from] ValidatorError),
    #[error(transparent)]
    Recovery(#[from] RecoveryError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Enforcement(#[from] EnforcementError),
    #[error(transparent)]
    Fidelity(#[from] FidelityError),
    #[error("governance task failed: {0}")]
    Task(String),
}
