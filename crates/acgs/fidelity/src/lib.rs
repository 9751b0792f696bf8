#![deny(unsafe_code)]
//! # acgs-fidelity
//!
//! Fidelity Monitor: folds synthesis success, enforcement accuracy,
//! adaptation velocity and stakeholder satisfaction into one score in
//! `[0, 1]`, minus a time-decayed appeal penalty.
//!
//! ```text
//! score = 0.3 * synthesis + 0.3 * accuracy + 0.2 * velocity + 0.2 * satisfaction
//!         - sum(severity * 0.5 ^ (age / half_life))
//! ```
//!
//! ## Key Types
//!
//! - [`FidelityMonitor`]: trackers, appeals, history and alerts
//! - [`FidelityScore`] / [`FidelityStatus`]: time-stamped result and band
//! - [`FidelityConfig`]: weights, half-life, bands and freeze cooldown

pub mod appeal;
pub mod config;
pub mod error;
pub mod monitor;
pub mod score;
pub mod trackers;

pub use appeal::{Appeal, AppealLedger, AppealSeverity};
pub use config::{FidelityConfig, FidelityWeights, SeverityPenalties};
pub use error::FidelityError;
pub use monitor::{FidelityAlert, FidelityMonitor};
pub use score::{weighted_score, FidelityComponents, FidelityScore, FidelityStatus};
pub use trackers::{
    AdaptationTracker, EnforcementAccuracyTracker, SatisfactionTracker, SynthesisTracker,
};
