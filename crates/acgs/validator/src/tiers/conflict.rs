use std::time::Instant;

use acgs_policy_lang::{CompiledRule, EvalLimits, ModelSearch, SearchLimits, SearchOutcome};
use acgs_store::RuleSetSnapshot;
use acgs_types::{
    ConflictKind, ConflictRecord, PrincipleId, RuleId, TierFindings, TierName, TierOutcome,
};
use tracing::debug;

use super::outcome;

/// One side of a pairwise conflict check.
#[derive(Clone, Copy, Debug)]
pub struct RuleRef<'a> {
    pub id: &'a RuleId,
    pub priority: u8,
    pub rule: &'a CompiledRule,
}

/// Search for an input on which both rules fire with different verdicts.
///
/// Symmetric: `detect_conflict(a, b)` and `detect_conflict(b, a)` return the
/// same record.
pub fn detect_conflict(
    a: RuleRef<'_>,
    b: RuleRef<'_>,
    search: &SearchLimits,
    eval: &EvalLimits,
) -> Option<ConflictRecord> {
    if a.rule.verdict == b.rule.verdict {
        return None;
    }
    let kind = if a.rule.verdict.contradicts(&b.rule.verdict) {
        ConflictKind::Contradiction
    } else {
        ConflictKind::Overlap
    };
    let found = ModelSearch::over([&a.rule.condition, &b.rule.condition])
        .with_limits(search.clone())
        .find(|input| {
            a.rule.fires(input, eval).unwrap_or(false) && b.rule.fires(input, eval).unwrap_or(false)
        });
    match found {
        SearchOutcome::Witness(witness) => Some(ConflictRecord::new(
            (a.id.clone(), a.priority, a.rule.verdict),
            (b.id.clone(), b.priority, b.rule.verdict),
            kind,
            witness,
        )),
        SearchOutcome::LimitReached { explored } => {
            debug!(first = %a.id, second = %b.id, explored, "conflict search hit its limit");
            None
        }
        SearchOutcome::Exhausted { .. } => None,
    }
}

/// Check a candidate against every active rule of other principles.
pub fn check(
    candidate: RuleRef<'_>,
    principle: &PrincipleId,
    active: &RuleSetSnapshot,
    auto_resolve: bool,
    search: &SearchLimits,
    eval: &EvalLimits,
) -> TierOutcome {
    let started = Instant::now();
    let mut conflicts = Vec::new();
    for other in active.iter() {
        if other.principle_id == *principle || other.id == *candidate.id {
            continue;
        }
        let theirs = RuleRef {
            id: &other.id,
            priority: other.priority,
            rule: &other.compiled,
        };
        if let Some(record) = detect_conflict(candidate, theirs, search, eval) {
            conflicts.push(record);
        }
    }

    let resolutions: Vec<_> = if auto_resolve {
        conflicts.iter().filter_map(ConflictRecord::resolution).collect()
    } else {
        Vec::new()
    };
    let unresolved = conflicts.len() - resolutions.len();
    let detail = if conflicts.is_empty() {
        format!("no conflicts with {} active rules", active.len())
    } else {
        conflicts
            .iter()
            .map(|c| {
                let state = match c.resolution() {
                    Some(r) if auto_resolve => format!("{} wins", r.winner),
                    _ => "unresolved".to_string(),
                };
                format!("{:?} between {} and {}: {}", c.kind, c.first, c.second, state)
            })
            .collect::<Vec<_>>()
            .join("; ")
    };

    outcome(
        TierName::Conflict,
        unresolved == 0,
        true,
        detail,
        started,
        TierFindings::Conflict {
            conflicts,
            resolutions,
        },
    )
}
