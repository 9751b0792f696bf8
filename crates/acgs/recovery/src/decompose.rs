//! Principle decomposition and sub-rule recombination.

use acgs_policy_lang::{CompiledRule, Expr};
use acgs_types::{Formalizability, Principle, PrincipleId, Scenario};

use crate::error::RecoveryError;

/// Split a principle into one sub-principle per violating scenario. Every
/// sub-principle keeps all of the parent's `allow` scenarios so its rule
/// cannot over-fire.
pub fn decompose(principle: &Principle) -> Result<Vec<Principle>, RecoveryError> {
    let (violating, permitted): (Vec<&Scenario>, Vec<&Scenario>) = principle
        .scenarios
        .iter()
        .partition(|s| s.then.is_violation());
    if violating.len() < 2 {
        return Err(RecoveryError::Decompose(format!(
            "{} has {} violating scenarios; need at least 2",
            principle.id,
            violating.len()
        )));
    }

    Ok(violating
        .into_iter()
        .enumerate()
        .map(|(i, scenario)| {
            let mut sub = Principle::new(
                format!("{}/part-{}", principle.id, i + 1),
                principle.priority,
                format!("{} ({})", principle.description, scenario.name),
            )
            .with_formalizability(Formalizability::Heuristic)
            .with_scenario(scenario.clone());
            for allowed in &permitted {
                sub = sub.with_scenario((*allowed).clone());
            }
            sub.safety_critical = principle.safety_critical;
            sub
        })
        .collect())
}

/// Merge sub-rules into one rule for the parent: the disjunction of their
/// conditions under their shared verdict.
pub fn recombine(parent: &Principle, parts: &[CompiledRule]) -> Result<String, RecoveryError> {
    let first = parts
        .first()
        .ok_or_else(|| RecoveryError::Recombine("no sub-rules".into()))?;
    if let Some(other) = parts.iter().find(|r| r.verdict != first.verdict) {
        return Err(RecoveryError::Recombine(format!(
            "verdicts differ: {} and {}",
            first.verdict, other.verdict
        )));
    }
    let condition = if parts.len() == 1 {
        first.condition.clone()
    } else {
        Expr::Or(parts.iter().map(|r| r.condition.clone()).collect())
    };
    Ok(CompiledRule::new(rule_name(&parent.id), condition, first.verdict, parent.description.clone()).render())
}

/// Whether a principle id belongs to a decomposition of `parent`.
pub fn is_part_of(id: &PrincipleId, parent: &PrincipleId) -> bool {
    id.as_str()
        .strip_prefix(parent.as_str())
        .map(|rest| rest.starts_with("/part-"))
        .unwrap_or(false)
}

fn rule_name(id: &PrincipleId) -> String {
    let name: String = id
        .as_str()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '-' })
        .collect();
    match name.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => name,
        _ => format!("rule-{}", name),
    }
}
