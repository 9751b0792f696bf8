#![deny(unsafe_code)]
//! # acgs-kernel
//!
//! Wires the governance crates into one pipeline: principles go in, rules
//! come out in the Active Rule Set, and the enforcement engine reads them.
//!
//! ## Key Types
//!
//! - [`GovernancePipeline`]: per-principle synthesize/validate/recover loop
//!   with promotion, escalation and cancellation
//! - [`GovernanceOutcome`]: how a run ended
//! - [`GovernanceConfig`]: every section's configuration, loadable from TOML
//!   with `strict` and `relaxed` presets
//! - [`CancelToken`]: cooperative cancellation for in-flight runs
//! - [`distance_score`]: risk/ambiguity summary recomputed from reports

pub mod cancel;
pub mod config;
pub mod distance;
pub mod error;
pub mod pipeline;

pub use cancel::{CancelRegistry, CancelToken};
pub use config::GovernanceConfig;
pub use distance::{distance_score, DISTANCE_WINDOW};
pub use error::{ConfigError, KernelError};
pub use pipeline::{GovernanceOutcome, GovernancePipeline};
