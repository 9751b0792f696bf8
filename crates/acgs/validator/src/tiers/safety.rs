use std::time::Instant;

use acgs_policy_lang::{is_builtin, CompiledRule, Expr};
use acgs_types::{
    Principle, SafetyFinding, SafetyFindingKind, TierFindings, TierName, TierOutcome, Verdict,
};

use super::outcome;

/// Static scan of a compiled rule for hazardous constructs.
pub fn scan(rule: &CompiledRule, max_nesting: usize) -> Vec<SafetyFinding> {
    let mut findings = Vec::new();
    rule.condition.walk(&mut |expr, _| {
        let kind = match expr {
            Expr::Loop(_) => Some(SafetyFindingKind::UnboundedIteration),
            Expr::Matches(_, pattern) if pattern.chars().all(|c| c == '*' || c == '?') => {
                Some(SafetyFindingKind::PermissiveWildcard)
            }
            Expr::Contains(_, needle) if needle.is_empty() => {
                Some(SafetyFindingKind::PermissiveWildcard)
            }
            Expr::Call(name, _) if !is_builtin(name) => Some(SafetyFindingKind::UnsafeBuiltin),
            _ => None,
        };
        if let Some(kind) = kind {
            findings.push(SafetyFinding {
                kind,
                construct: expr.to_string(),
            });
        }
    });

    if rule.verdict == Verdict::Allow && rule.condition == Expr::Bool(true) {
        findings.push(SafetyFinding {
            kind: SafetyFindingKind::PermissiveWildcard,
            construct: rule.condition.to_string(),
        });
    }

    let depth = rule.condition.max_depth();
    if depth > max_nesting {
        findings.push(SafetyFinding {
            kind: SafetyFindingKind::ExcessiveNesting,
            construct: format!("depth {} exceeds {}", depth, max_nesting),
        });
    }
    findings
}

/// Mandatory for safety-critical principles, advisory otherwise.
pub fn check(rule: &CompiledRule, principle: &Principle, max_nesting: usize) -> TierOutcome {
    let started = Instant::now();
    let findings = scan(rule, max_nesting);
    let detail = if findings.is_empty() {
        "no hazardous constructs".to_string()
    } else {
        findings
            .iter()
            .map(|f| format!("{}: {}", f.kind, f.construct))
            .collect::<Vec<_>>()
            .join("; ")
    };
    outcome(
        TierName::Safety,
        findings.is_empty(),
        principle.safety_critical,
        detail,
        started,
        TierFindings::Safety { findings },
    )
}
