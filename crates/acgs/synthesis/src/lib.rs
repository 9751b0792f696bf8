#![deny(unsafe_code)]
//! # acgs-synthesis
//!
//! Rule Synthesizer: turns one principle into candidate rules through one
//! or more [`RuleOracle`]s.
//!
//! ## Key Types
//!
//! - [`RuleSynthesizer`]: parallel oracle fan-out with per-call timeouts,
//!   bounded retries and a per-principle attempt counter
//! - [`RuleOracle`]: capability trait; [`TemplateOracle`], [`FixtureOracle`],
//!   [`FailingOracle`] and [`HttpOracle`] implement it
//! - [`SynthesisContext`]: active rules and corrective hints from recovery
//! - [`SynthesisPromptBuilder`]: renders the oracle prompt

pub mod context;
pub mod error;
pub mod http;
pub mod oracle;
pub mod prompt;
pub mod synthesizer;

pub use context::{RuleSummary, SynthesisContext};
pub use error::SynthesisError;
pub use http::{parse_reply, HttpOracle, HttpOracleConfig};
pub use oracle::{
    FailingOracle, FixtureOracle, FixtureReply, OracleRequest, OracleResponse, RuleOracle,
    TemplateOracle,
};
pub use prompt::SynthesisPromptBuilder;
pub use synthesizer::{unwrap_code_fence, RuleSynthesizer, SynthesisConfig};
