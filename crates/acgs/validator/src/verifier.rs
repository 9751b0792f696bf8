//! Formal verification backends.
//!
//! A verifier decides whether a rule fires on exactly the inputs where the
//! principle's formal intent holds. The default [`BoundedModelChecker`]
//! answers the satisfiability query "is there an input where the two
//! disagree?" by exhaustive search over the finite domain both expressions
//! induce.

use std::sync::Arc;
use std::time::{Duration, Instant};

use acgs_policy_lang::{
    evaluate_condition, CompiledRule, EvalLimits, Expr, ModelSearch, SearchLimits, SearchOutcome,
};
use acgs_types::{GovernanceFault, VerificationOutcome};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

/// Formal verification capability.
#[async_trait]
pub trait FormalVerifier: Send + Sync {
    fn id(&self) -> &str;

    /// Verify `rule` against `intent`. Returns
    /// [`GovernanceFault::FormalVerificationTimeout`] when `timeout` elapses.
    async fn verify(
        &self,
        rule: Arc<CompiledRule>,
        intent: Arc<Expr>,
        timeout: Duration,
    ) -> Result<VerificationOutcome, GovernanceFault>;
}

/// Exhaustive search over the joint finite domain.
#[derive(Clone, Debug)]
pub struct BoundedModelChecker {
    max_assignments: u64,
    eval: EvalLimits,
}

impl BoundedModelChecker {
    pub fn new(max_assignments: u64, eval_steps: u64) -> Self {
        Self {
            max_assignments,
            eval: EvalLimits::new(eval_steps),
        }
    }

    /// Synchronous check with an absolute deadline.
    pub fn check(&self, rule: &CompiledRule, intent: &Expr, deadline: Option<Instant>) -> VerificationOutcome {
        let search = ModelSearch::over([&rule.condition, intent]).with_limits(SearchLimits {
            max_assignments: self.max_assignments,
            deadline,
        });
        let disagrees = |input: &Value| {
            let fires = rule.fires(input, &self.eval);
            let holds = evaluate_condition(intent, input, &self.eval);
            match (fires, holds) {
                (Ok(a), Ok(b)) => a != b,
                _ => true,
            }
        };
        match search.find(disagrees) {
            SearchOutcome::Witness(counterexample) => VerificationOutcome::Disproved { counterexample },
            SearchOutcome::Exhausted { explored } => {
                debug!(explored, rule = %rule.name, "domain exhausted without counterexample");
                VerificationOutcome::Proved
            }
            SearchOutcome::LimitReached { explored } => VerificationOutcome::Inapplicable {
                reason: format!("search stopped after {} assignments", explored),
            },
        }
    }
}

impl Default for BoundedModelChecker {
    fn default() -> Self {
        Self::new(20_000, 10_000)
    }
}

#[async_trait]
impl FormalVerifier for BoundedModelChecker {
    fn id(&self) -> &str {
        "bounded-model-checker"
    }

    async fn verify(
        &self,
        rule: Arc<CompiledRule>,
        intent: Arc<Expr>,
        timeout: Duration,
    ) -> Result<VerificationOutcome, GovernanceFault> {
        let checker = self.clone();
        let deadline = Instant::now() + timeout;
        let task = tokio::task::spawn_blocking(move || checker.check(&rule, &intent, Some(deadline)));
        let ms = timeout.as_millis() as u64;
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(VerificationOutcome::Inapplicable { .. })) if Instant::now() >= deadline => {
                Err(GovernanceFault::FormalVerificationTimeout(ms))
            }
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(join)) => Ok(VerificationOutcome::Inapplicable {
                reason: format!("verifier task failed: {}", join),
            }),
            Err(_) => Err(GovernanceFault::FormalVerificationTimeout(ms)),
        }
    }
}

/// Verifier that never answers in time. Test double for timeout handling.
#[derive(Clone, Debug, Default)]
pub struct StallingVerifier;

#[async_trait]
impl FormalVerifier for StallingVerifier {
    fn id(&self) -> &str {
        "stalling"
    }

    async fn verify(
        &self,
        _rule: Arc<CompiledRule>,
        _intent: Arc<Expr>,
        timeout: Duration,
    ) -> Result<VerificationOutcome, GovernanceFault> {
        tokio::time::sleep(timeout).await;
        Err(GovernanceFault::FormalVerificationTimeout(timeout.as_millis() as u64))
    }
}
