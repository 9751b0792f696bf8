#![deny(unsafe_code)]
//! # acgs-store
//!
//! State shared between synthesis and enforcement.
//!
//! - [`PrincipleStore`]: versioned principles; amendments archive, retirement
//!   never deletes
//! - [`ActiveRuleSet`]: copy-on-write rule set with a single writer and
//!   lock-free-for-readers `Arc` snapshots
//! - [`AuditSink`]: destination for validation reports, decisions,
//!   promotions and escalations ([`InMemoryAuditSink`], [`JsonlAuditSink`])

pub mod audit;
pub mod error;
pub mod principles;
pub mod rule_set;

pub use audit::{AuditEntry, AuditRecord, AuditSink, InMemoryAuditSink, JsonlAuditSink};
pub use error::StoreError;
pub use principles::{DistanceTransition, PrincipleSnapshot, PrincipleStore};
pub use rule_set::{ActiveRule, ActiveRuleSet, RuleSetSnapshot, RuleSetWriter};
