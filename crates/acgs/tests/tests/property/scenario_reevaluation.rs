//! Property tests: a rule that passes every mandatory tier reproduces all of
//! its principle's scenarios when evaluated again.

use acgs_policy_lang::{compile_rule, EvalLimits};
use acgs_store::RuleSetSnapshot;
use acgs_types::{CandidateRule, Principle, Scenario, Verdict};
use acgs_validator::{TieredValidator, ValidatorConfig};
use proptest::prelude::*;
use serde_json::json;

fn principle(floor: i64, values: &[i64]) -> Principle {
    values.iter().enumerate().fold(
        Principle::new("floor", 5, "reject readings under the floor"),
        |p, (i, v)| {
            let then = if *v < floor { Verdict::Deny } else { Verdict::Allow };
            p.with_scenario(Scenario::new(format!("reading-{}", i), json!({"reading": v}), then))
        },
    )
}

proptest! {
    #[test]
    fn promotable_rules_match_every_scenario(
        floor in 1i64..100,
        offset in -3i64..=3,
        values in prop::collection::vec(0i64..150, 1..8),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let principle = principle(floor, &values);
            let body = format!(
                "(rule floor (when (< reading {})) (then deny \"reading under the floor\"))",
                floor + offset
            );
            let candidate = CandidateRule::new(principle.id.clone(), body.clone(), "fixture");
            let validator = TieredValidator::new(ValidatorConfig::default()).unwrap();
            let report = validator
                .validate(&candidate, &principle, &RuleSetSnapshot::default())
                .await;

            if offset == 0 {
                prop_assert!(report.promotable());
            }
            if report.promotable() {
                let rule = compile_rule(&body).unwrap();
                let limits = EvalLimits::default();
                for s in &principle.scenarios {
                    let fires = rule.fires(&s.input(), &limits).unwrap();
                    prop_assert_eq!(fires, s.then.is_violation(), "scenario {}", s.name);
                }
            }
            Ok(())
        })?;
    }
}
