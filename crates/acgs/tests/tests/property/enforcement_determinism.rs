//! Property tests: the same proposal against the same rule-set version
//! always gets the same decision, cached or not.

use acgs_enforcement::{EnforcementConfig, PgcEngine};
use acgs_store::{ActiveRule, ActiveRuleSet};
use acgs_tests::{fast_lane, risk_limit, safety_margin, FAST_LANE_RULE};
use acgs_types::{CandidateRule, HumanApproval, Principle, PromotionBasis, Proposal};
use proptest::prelude::*;
use serde_json::json;

fn active(principle: &Principle, body: &str) -> ActiveRule {
    let candidate = CandidateRule::new(principle.id.clone(), body, "fixture");
    ActiveRule::from_candidate(
        &candidate,
        principle,
        PromotionBasis::HumanApproved(HumanApproval::new("test")),
    )
    .unwrap()
}

fn rule_set() -> ActiveRuleSet {
    let set = ActiveRuleSet::new();
    let mut writer = set.begin_write();
    writer.promote(active(
        &risk_limit(),
        r#"(rule risk (when (> risk 5)) (then deny "risk above 5"))"#,
    ));
    writer.promote(active(
        &safety_margin(),
        r#"(rule margin (when (< margin_pct 20)) (then warn "thin margin"))"#,
    ));
    writer.promote(active(&fast_lane(), FAST_LANE_RULE));
    writer.commit();
    set
}

fn arb_lane() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("fast"), Just("slow")]
}

proptest! {
    #[test]
    fn decisions_are_deterministic_per_version(
        risk in 0i64..12,
        margin in 0i64..60,
        lane in arb_lane(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let set = rule_set();
            let cached = PgcEngine::new(set.clone(), EnforcementConfig::default()).unwrap();
            let uncached =
                PgcEngine::new(set, EnforcementConfig::default().with_cache_capacity(0)).unwrap();
            let payload = json!({"risk": risk, "margin_pct": margin, "lane": lane});

            let first = cached.evaluate_current(&Proposal::new("a", payload.clone())).await;
            let again = cached.evaluate_current(&Proposal::new("b", payload.clone())).await;
            let fresh = uncached.evaluate_current(&Proposal::new("c", payload)).await;

            prop_assert!(again.cache_hit);
            prop_assert!(!fresh.cache_hit);
            prop_assert!(first.same_outcome(&again));
            prop_assert!(first.same_outcome(&fresh));
            prop_assert_eq!(first.fingerprint, fresh.fingerprint);
            prop_assert_eq!(again.proposal_id.as_str(), "b");
            Ok(())
        })?;
    }
}
