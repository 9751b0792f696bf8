//! Single-rule evaluation seam.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use acgs_policy_lang::{EvalLimits, PolicyLangError};
use acgs_store::ActiveRule;
use acgs_types::RuleId;
use serde_json::Value;

/// Decides whether one active rule fires for a proposal payload.
///
/// Runs on a blocking thread; implementations may take real time but must
/// honour `limits.deadline` when they can.
pub trait RuleEvaluator: Send + Sync {
    fn fires(
        &self,
        rule: &ActiveRule,
        input: &Value,
        limits: &EvalLimits,
    ) -> Result<bool, PolicyLangError>;
}

/// Evaluates the rule's compiled condition.
#[derive(Clone, Copy, Debug, Default)]
pub struct CompiledEvaluator;

impl RuleEvaluator for CompiledEvaluator {
    fn fires(
        &self,
        rule: &ActiveRule,
        input: &Value,
        limits: &EvalLimits,
    ) -> Result<bool, PolicyLangError> {
        rule.compiled.fires(input, limits)
    }
}

/// Sleeps before delegating. Used to verify the latency ceiling.
pub struct DelayedEvaluator {
    delay: Duration,
    only: Option<BTreeSet<RuleId>>,
    inner: Arc<dyn RuleEvaluator>,
}

impl DelayedEvaluator {
    /// Delay every rule.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            only: None,
            inner: Arc::new(CompiledEvaluator),
        }
    }

    /// Delay only the listed rules.
    pub fn for_rules(delay: Duration, rules: impl IntoIterator<Item = RuleId>) -> Self {
        Self {
            only: Some(rules.into_iter().collect()),
            ..Self::new(delay)
        }
    }
}

impl RuleEvaluator for DelayedEvaluator {
    fn fires(
        &self,
        rule: &ActiveRule,
        input: &Value,
        limits: &EvalLimits,
    ) -> Result<bool, PolicyLangError> {
        let slow = self.only.as_ref().map_or(true, |ids| ids.contains(&rule.id));
        if slow {
            std::thread::sleep(self.delay);
            if limits.deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(PolicyLangError::DeadlineExceeded);
            }
        }
        self.inner.fires(rule, input, limits)
    }
}
