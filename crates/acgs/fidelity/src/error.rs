//! Error types for the fidelity monitor.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FidelityError {
    #[error("invalid fidelity configuration: {0}")]
    InvalidConfig(String),

    /// A tracker sample outside its domain.
    #[error("invalid sample: {0}")]
    InvalidSample(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(
            FidelityError::InvalidSample("satisfaction 1.4 outside [0, 1]".into()).to_string(),
            "invalid sample: satisfaction 1.4 outside [0, 1]"
        );
    }
}
