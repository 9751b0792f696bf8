//! End-to-end test: promotion publishes a whole new version at once, and
//! an evaluation pinned to an older version finishes against it.

use std::sync::Arc;

use acgs_enforcement::{EnforcementConfig, PgcEngine};
use acgs_store::{ActiveRule, ActiveRuleSet};
use acgs_tests::{risk_limit, safety_margin};
use acgs_types::{CandidateRule, HumanApproval, Principle, PromotionBasis, Proposal, Verdict};
use serde_json::json;

const RISK_RULE: &str = r#"(rule risk (when (> risk 5)) (then deny "risk above 5"))"#;
const MARGIN_RULE: &str = r#"(rule margin (when (< margin_pct 20)) (then deny "margin below 20 percent"))"#;

fn active(principle: &Principle, body: &str) -> ActiveRule {
    let candidate = CandidateRule::new(principle.id.clone(), body, "fixture");
    ActiveRule::from_candidate(
        &candidate,
        principle,
        PromotionBasis::HumanApproved(HumanApproval::new("test")),
    )
    .unwrap()
}

fn promote_both(set: &ActiveRuleSet) -> u64 {
    let mut writer = set.begin_write();
    writer.promote(active(&risk_limit(), RISK_RULE));
    writer.promote(active(&safety_margin(), MARGIN_RULE));
    writer.commit()
}

fn proposal(id: &str) -> Proposal {
    Proposal::new(id, json!({"risk": 9, "margin_pct": 1}))
}

#[tokio::test]
async fn pinned_evaluation_uses_its_starting_version() {
    let set = ActiveRuleSet::new();
    let engine = PgcEngine::new(set.clone(), EnforcementConfig::default()).unwrap();
    let before = set.snapshot();

    assert_eq!(promote_both(&set), 1);

    let old = engine.evaluate(&proposal("p-1"), before).await;
    assert_eq!(old.rule_set_version, 0);
    assert_eq!(old.verdict, Verdict::Allow);

    let new = engine.evaluate_current(&proposal("p-2")).await;
    assert_eq!(new.rule_set_version, 1);
    assert_eq!(new.verdict, Verdict::Deny);
    assert_eq!(new.violations.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_readers_never_see_a_partial_version() {
    let set = ActiveRuleSet::new();
    let engine = Arc::new(
        PgcEngine::new(set.clone(), EnforcementConfig::default().with_cache_capacity(0)).unwrap(),
    );

    let readers: Vec<_> = (0..64)
        .map(|i| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.evaluate_current(&proposal(&format!("p-{}", i))).await })
        })
        .collect();
    promote_both(&set);

    for reader in readers {
        let decision = reader.await.unwrap();
        match decision.rule_set_version {
            0 => assert!(decision.violations.is_empty()),
            1 => assert_eq!(decision.violations.len(), 2),
            v => panic!("unexpected version {}", v),
        }
    }
}
