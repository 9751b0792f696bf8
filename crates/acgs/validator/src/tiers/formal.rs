use std::sync::Arc;
use std::time::{Duration, Instant};

use acgs_policy_lang::{compile_condition, CompiledRule};
use acgs_types::{Principle, TierFindings, TierName, TierOutcome, VerificationOutcome};
use tracing::warn;

use super::outcome;
use crate::verifier::FormalVerifier;

/// Verify the rule against the principle's formal spec. Only a disproof
/// fails; a missing spec or a timeout is inapplicable.
pub async fn check(
    rule: Arc<CompiledRule>,
    principle: &Principle,
    verifier: &dyn FormalVerifier,
    timeout: Duration,
) -> TierOutcome {
    let started = Instant::now();
    let mandatory = principle.formalizability.formal_tier_mandatory();

    let verification = match principle.formal_spec.as_deref().map(compile_condition) {
        None => VerificationOutcome::Inapplicable {
            reason: "principle has no formal spec".into(),
        },
        Some(Err(e)) => {
            warn!(principle_id = %principle.id, error = %e, "formal spec does not compile");
            VerificationOutcome::Inapplicable {
                reason: format!("formal spec does not compile: {}", e),
            }
        }
        Some(Ok(intent)) => match verifier.verify(rule, Arc::new(intent), timeout).await {
            Ok(v) => v,
            Err(fault) => {
                warn!(principle_id = %principle.id, verifier = verifier.id(), %fault, "formal verification gave no answer");
                VerificationOutcome::Inapplicable {
                    reason: fault.to_string(),
                }
            }
        },
    };

    let detail = match &verification {
        VerificationOutcome::Proved => format!("proved by {}", verifier.id()),
        VerificationOutcome::Disproved { counterexample } => {
            format!("disproved: counterexample {}", counterexample)
        }
        VerificationOutcome::Inapplicable { reason } => format!("inapplicable: {}", reason),
    };
    outcome(
        TierName::Formal,
        !verification.is_disproved(),
        mandatory,
        detail,
        started,
        TierFindings::Formal {
            outcome: verification,
        },
    )
}
