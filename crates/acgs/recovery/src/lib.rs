#![deny(unsafe_code)]
//! # acgs-recovery
//!
//! Recovery Dispatcher: picks a remediation after a failed validation and
//! hands principles that exhaust their retry budget to human review.
//!
//! ## Key Types
//!
//! - [`RecoveryDispatcher`]: pure strategy selection ([`select`]) plus the
//!   append-only [`RecoveryLog`]
//! - [`RecoveryStrategy`]: the concrete remediation; [`RecoveryStrategy::apply`]
//!   folds it into the next synthesis context
//! - [`decompose`] / [`recombine`]: sub-principle split and merge
//! - [`HumanReviewQueue`]: escalation packets awaiting approve/reject

pub mod config;
pub mod decompose;
pub mod dispatcher;
pub mod error;
pub mod escalation;
pub mod log;
pub mod strategy;

pub use config::{FailureClass, RecoveryConfig, StrategyFamily, StrategyMap};
pub use decompose::{decompose, is_part_of, recombine};
pub use dispatcher::{select, select_for_synthesis, Dispatch, RecoveryDispatcher};
pub use error::RecoveryError;
pub use escalation::{EscalationPacket, HumanReviewQueue, ReviewItem, ReviewStatus};
pub use log::{LogEntry, MappingProposal, RecoveryLog, StrategyEffectiveness, StrategyOutcome};
pub use strategy::{RecoveryStrategy, CANONICAL_TEMPLATE};
