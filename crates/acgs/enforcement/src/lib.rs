#![deny(unsafe_code)]
//! # acgs-enforcement
//!
//! The Enforcement Engine (PGC): gates every upstream proposal against the
//! active rule set and answers allow, warn or deny within a hard latency
//! ceiling. Anything that prevents a full evaluation yields a fail-safe deny.
//!
//! ## Key Types
//!
//! - [`PgcEngine`]: evaluates proposals against an explicit rule-set
//!   version handle
//! - [`RuleEvaluator`]: how a single rule is checked ([`CompiledEvaluator`]
//!   in production, [`DelayedEvaluator`] for latency drills)
//! - [`resolve`]: pure verdict composition over the fired rules
//! - [`DecisionCache`]: decisions keyed by (fingerprint, version)

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod resolve;
pub mod stats;

pub use cache::DecisionCache;
pub use config::EnforcementConfig;
pub use engine::PgcEngine;
pub use error::EnforcementError;
pub use evaluator::{CompiledEvaluator, DelayedEvaluator, RuleEvaluator};
pub use resolve::{fired_rules, resolve, Resolution};
pub use stats::{EngineStats, EnforcementStats};
