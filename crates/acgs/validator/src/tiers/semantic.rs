use std::time::Instant;

use acgs_policy_lang::{CompiledRule, EvalLimits};
use acgs_types::{Principle, Scenario, TierFindings, TierName, TierOutcome, Verdict};

use super::outcome;
use crate::config::ScenarioThreshold;

/// What the rule yields for a scenario: its verdict when it fires, `allow`
/// otherwise.
pub fn scenario_verdict(
    rule: &CompiledRule,
    scenario: &Scenario,
    limits: &EvalLimits,
) -> Result<Verdict, String> {
    match rule.fires(&scenario.input(), limits) {
        Ok(true) => Ok(rule.verdict),
        Ok(false) => Ok(Verdict::Allow),
        Err(e) => Err(e.to_string()),
    }
}

/// Run the rule on every scenario and compare with the expected verdict.
pub fn check(
    rule: &CompiledRule,
    principle: &Principle,
    threshold: ScenarioThreshold,
    limits: &EvalLimits,
) -> TierOutcome {
    let started = Instant::now();
    if principle.scenarios.is_empty() {
        return outcome(
            TierName::Semantic,
            false,
            true,
            "principle has no scenarios",
            started,
            TierFindings::Semantic {
                failed_scenarios: Vec::new(),
                pass_rate: 0.0,
            },
        );
    }

    let mut failed = Vec::new();
    let mut failed_mandatory = 0usize;
    let mut notes = Vec::new();
    for scenario in &principle.scenarios {
        let matched = match scenario_verdict(rule, scenario, limits) {
            Ok(actual) if actual == scenario.then => true,
            Ok(actual) => {
                notes.push(format!("{}: expected {}, got {}", scenario.name, scenario.then, actual));
                false
            }
            Err(e) => {
                notes.push(format!("{}: evaluation error: {}", scenario.name, e));
                false
            }
        };
        if !matched {
            failed.push(scenario.name.clone());
            if scenario.mandatory {
                failed_mandatory += 1;
            }
        }
    }

    let total = principle.scenarios.len();
    let pass_rate = (total - failed.len()) as f64 / total as f64;
    let passed = match threshold {
        ScenarioThreshold::All => failed.is_empty(),
        ScenarioThreshold::MandatoryOnly => failed_mandatory == 0,
        ScenarioThreshold::Fraction(min) => pass_rate >= min,
    };
    let detail = if notes.is_empty() {
        format!("{}/{} scenarios matched", total, total)
    } else {
        format!(
            "{}/{} scenarios matched; {}",
            total - failed.len(),
            total,
            notes.join("; ")
        )
    };

    outcome(
        TierName::Semantic,
        passed,
        true,
        detail,
        started,
        TierFindings::Semantic {
            failed_scenarios: failed,
            pass_rate,
        },
    )
}
