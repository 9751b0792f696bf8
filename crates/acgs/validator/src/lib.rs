#![deny(unsafe_code)]
//! # acgs-validator
//!
//! Tiered Validator: decides whether a candidate rule may join the Active
//! Rule Set.
//!
//! Tiers run in order (syntax, semantic, safety, bias, conflict, formal)
//! and stop at the first mandatory failure. Every run yields an immutable
//! [`ValidationReport`](acgs_types::ValidationReport).
//!
//! ## Key Types
//!
//! - [`TieredValidator`]: runs the tiers
//! - [`FormalVerifier`]: pluggable verification backend;
//!   [`BoundedModelChecker`] is the default
//! - [`promote`] / [`promote_with_approval`]: atomic admission into the
//!   rule set

pub mod config;
pub mod error;
pub mod promotion;
pub mod tiers;
pub mod validator;
pub mod verifier;

pub use config::{BiasConfig, ScenarioThreshold, ValidatorConfig};
pub use error::ValidatorError;
pub use promotion::{promote, promote_with_approval, Promotion};
pub use tiers::bias::{risk_score, BiasAssessment};
pub use tiers::conflict::{detect_conflict, RuleRef};
pub use validator::{mark, status_of, TieredValidator};
pub use verifier::{BoundedModelChecker, FormalVerifier, StallingVerifier};
