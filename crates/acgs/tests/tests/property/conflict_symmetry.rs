//! Property tests: pairwise conflict detection does not depend on which
//! rule is checked first, and every reported witness fires both rules.

use acgs_policy_lang::{compile_rule, EvalLimits, SearchLimits};
use acgs_types::RuleId;
use acgs_validator::{detect_conflict, RuleRef};
use proptest::prelude::*;

fn arb_verdict() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("allow"), Just("warn"), Just("deny")]
}

proptest! {
    #[test]
    fn detection_is_symmetric(
        high in 0i64..60,
        low in 0i64..60,
        first_priority in 0u8..10,
        second_priority in 0u8..10,
        verdict in arb_verdict(),
    ) {
        let a = compile_rule(&format!("(rule a (when (> load {})) (then deny \"load high\"))", high)).unwrap();
        let b = compile_rule(&format!("(rule b (when (< load {})) (then {} \"load low\"))", low, verdict)).unwrap();
        let (ia, ib) = (RuleId::new("rule-a"), RuleId::new("rule-b"));
        let ra = RuleRef { id: &ia, priority: first_priority, rule: &a };
        let rb = RuleRef { id: &ib, priority: second_priority, rule: &b };
        let search = SearchLimits::default();
        let eval = EvalLimits::default();

        let ab = detect_conflict(ra, rb, &search, &eval);
        let ba = detect_conflict(rb, ra, &search, &eval);
        prop_assert_eq!(&ab, &ba);

        if let Some(record) = ab {
            prop_assert!(a.fires(&record.witness, &eval).unwrap());
            prop_assert!(b.fires(&record.witness, &eval).unwrap());
            prop_assert_eq!(record.resolvable(), first_priority != second_priority);
        }
        if verdict == "deny" {
            prop_assert!(ba.is_none());
        }
    }
}
