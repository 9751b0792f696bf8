#![deny(unsafe_code)]
//! # acgs-policy-lang
//!
//! The rule language enforced by the governance layer.
//!
//! Rules are S-expressions:
//!
//! ```text
//! (rule min-safety-margin
//!   (when (< metrics.safety_margin 0.2))
//!   (then deny "safety margin below 0.2"))
//! ```
//!
//! This crate provides:
//! - a reader ([`parse_sexpr`]) and compiler ([`compile_rule`]) with a hard
//!   nesting ceiling
//! - a bounded evaluator ([`Evaluator`], [`CompiledRule::fires`]) with a step
//!   budget, deadline and cancel flag
//! - a finite-domain [`ModelSearch`] used for conflict detection and bounded
//!   formal verification

pub mod ast;
pub mod compiler;
pub mod domain;
pub mod error;
pub mod eval;
pub mod sexpr;

pub use ast::{CmpOp, CompiledRule, Expr, Path};
pub use compiler::{compile_condition, compile_rule, MAX_COMPILE_DEPTH};
pub use domain::{set_path, Domain, ModelSearch, SearchLimits, SearchOutcome, OTHER_STRING};
pub use error::PolicyLangError;
pub use eval::{evaluate_condition, glob_match, is_builtin, EvalLimits, Evaluator, BUILTINS};
pub use sexpr::{parse_sexpr, SExpr, MAX_INPUT_BYTES, MAX_READ_DEPTH};
