//! Verdict composition over the rules a proposal fired.
//!
//! A mandatory permit (an `allow` rule that fired) suppresses violations of
//! strictly lower priority. At equal or lower permit priority the violation
//! stands, so equal-priority contradictions resolve to the stricter verdict.
//! Advisory permits never suppress anything, but a fired advisory permit
//! contradicted by a standing violation is still recorded as a conflict.

use acgs_policy_lang::{EvalLimits, PolicyLangError};
use acgs_store::{ActiveRule, RuleSetSnapshot};
use acgs_types::{EnforcementMode, RuleId, RuntimeConflict, Verdict, Violation};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::evaluator::RuleEvaluator;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub verdict: Verdict,
    /// Contributing violations, highest priority first.
    pub violations: Vec<Violation>,
    /// Highest-priority violation among those producing the verdict.
    pub primary: Option<Violation>,
    pub overridden: Vec<Violation>,
    pub conflicts: Vec<RuntimeConflict>,
}

/// Every rule that fires for `payload`, highest priority first. Stops at the
/// first rule that cannot be evaluated.
pub fn fired_rules<'s>(
    snapshot: &'s RuleSetSnapshot,
    payload: &Value,
    evaluator: &dyn RuleEvaluator,
    limits: &EvalLimits,
) -> Result<Vec<&'s ActiveRule>, (RuleId, PolicyLangError)> {
    let mut fired = Vec::new();
    for rule in snapshot.by_priority() {
        match evaluator.fires(rule, payload, limits) {
            Ok(true) => fired.push(rule),
            Ok(false) => {}
            Err(e) => return Err((rule.id.clone(), e)),
        }
    }
    Ok(fired)
}

/// Compose a verdict. `fired` must be ordered highest priority first.
pub fn resolve(fired: &[&ActiveRule]) -> Resolution {
    let permits: Vec<&ActiveRule> = fired
        .iter()
        .copied()
        .filter(|r| r.is_permit() && r.mode == EnforcementMode::Mandatory)
        .collect();

    let mut violations = Vec::new();
    let mut overridden = Vec::new();
    let mut conflicts = Vec::new();

    for rule in fired.iter().copied().filter(|r| !r.is_permit()) {
        let violation = violation_of(rule);
        match permits.iter().find(|p| p.priority > rule.priority) {
            Some(permit) => {
                conflicts.push(conflict(
                    (&permit.id, permit.priority, permit.verdict()),
                    (&violation.rule_id, violation.priority, violation.verdict),
                ));
                overridden.push(violation);
            }
            None => violations.push(violation),
        }
    }

    for permit in fired.iter().copied().filter(|r| r.is_permit()) {
        let advisory = permit.mode == EnforcementMode::Advisory;
        if let Some(winner) = violations
            .first()
            .filter(|v| advisory || v.priority >= permit.priority)
        {
            conflicts.push(conflict(
                (&winner.rule_id, winner.priority, winner.verdict),
                (&permit.id, permit.priority, permit.verdict()),
            ));
        }
    }

    let verdict = violations
        .iter()
        .map(Violation::effective_verdict)
        .max()
        .unwrap_or(Verdict::Allow);
    let primary = violations
        .iter()
        .find(|v| v.effective_verdict() == verdict)
        .cloned();

    Resolution {
        verdict,
        violations,
        primary,
        overridden,
        conflicts,
    }
}

fn violation_of(rule: &ActiveRule) -> Violation {
    Violation {
        rule_id: rule.id.clone(),
        principle_id: rule.principle_id.clone(),
        priority: rule.priority,
        verdict: rule.verdict(),
        mode: rule.mode,
        explanation: rule.compiled.explanation.clone(),
    }
}

fn conflict(winner: (&RuleId, u8, Verdict), loser: (&RuleId, u8, Verdict)) -> RuntimeConflict {
    RuntimeConflict {
        winner: winner.0.clone(),
        winner_priority: winner.1,
        winner_verdict: winner.2,
        loser: loser.0.clone(),
        loser_priority: loser.1,
        loser_verdict: loser.2,
    }
}
