//! Error types for engine construction.
//!
//! Evaluation itself never fails: every problem becomes a fail-safe deny.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnforcementError {
    #[error("invalid enforcement configuration: {0}")]
    InvalidConfig(String),
}
