use std::time::Instant;

use acgs_policy_lang::{compile_rule, CompiledRule};
use acgs_types::{CandidateRule, TierFindings, TierName, TierOutcome};

use super::outcome;

/// Parse the candidate body. Always mandatory.
pub fn check(candidate: &CandidateRule) -> (TierOutcome, Option<CompiledRule>) {
    let started = Instant::now();
    if let Some(issue) = &candidate.synthesis_issue {
        let detail = format!("malformed synthesis output: {}", issue);
        return (
            outcome(
                TierName::Syntax,
                false,
                true,
                detail,
                started,
                TierFindings::Syntax {
                    error: Some(issue.clone()),
                },
            ),
            None,
        );
    }
    match compile_rule(&candidate.body) {
        Ok(rule) => (
            outcome(
                TierName::Syntax,
                true,
                true,
                format!("rule '{}' compiled", rule.name),
                started,
                TierFindings::Syntax { error: None },
            ),
            Some(rule),
        ),
        Err(e) => (
            outcome(
                TierName::Syntax,
                false,
                true,
                e.to_string(),
                started,
                TierFindings::Syntax {
                    error: Some(e.to_string()),
                },
            ),
            None,
        ),
    }
}
