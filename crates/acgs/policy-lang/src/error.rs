//! Error types for the rule language.

use thiserror::Error;

/// Errors that can occur while parsing, compiling or evaluating rules.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyLangError {
    /// The text is not a well-formed S-expression.
    #[error("parse error: {0}")]
    Parse(String),

    /// Well-formed S-expression that is not a valid rule.
    #[error("compile error: {0}")]
    Compile(String),

    /// The evaluation step budget was exhausted.
    #[error("evaluation budget of {0} steps exhausted")]
    BudgetExceeded(u64),

    /// The evaluation deadline passed before a result was produced.
    #[error("evaluation deadline exceeded")]
    DeadlineExceeded,

    /// Evaluation was cancelled by the caller.
    #[error("evaluation cancelled")]
    Cancelled,

    /// A `(call ...)` named a function outside the whitelist.
    #[error("unknown built-in: {0}")]
    UnknownBuiltin(String),

    /// A built-in received arguments it cannot handle.
    #[error("bad arguments to {name}: {detail}")]
    BadArguments { name: String, detail: String },
}

impl PolicyLangError {
    /// Errors produced by the grammar rather than by evaluation.
    pub fn is_syntax(&self) -> bool {
        matches!(self, Self::Parse(_) | Self::Compile(_))
    }
}
