//! Shared principles for the cross-crate tests.

use acgs_store::PrincipleStore;
use acgs_types::{Formalizability, Principle, Scenario, Verdict};
use serde_json::json;

/// Minimum safety margin, in percent.
pub const MARGIN_FLOOR: i64 = 20;

/// Rule a fixture oracle proposes for [`fast_lane`].
pub const FAST_LANE_RULE: &str =
    r#"(rule fast-lane (when (== lane "fast")) (then allow "fast lane is always permitted"))"#;

/// Safety-critical, formally verifiable: deny below the margin floor.
pub fn safety_margin() -> Principle {
    Principle::new(
        "safety-margin",
        9,
        "never accept a candidate whose safety margin is below 20 percent",
    )
    .with_formalizability(Formalizability::FormallyVerifiable)
    .with_formal_spec(format!("(< margin_pct {})", MARGIN_FLOOR))
    .with_scenario(Scenario::new("thin", json!({"margin_pct": 5}), Verdict::Deny))
    .with_scenario(Scenario::new("comfortable", json!({"margin_pct": 45}), Verdict::Allow))
    .safety_critical()
}

/// Priority 9: deny risky candidates.
pub fn risk_limit() -> Principle {
    Principle::new("risk-limit", 9, "reject candidates with risk above 5")
        .with_formal_spec("(> risk 5)")
        .with_scenario(Scenario::new("risky", json!({"risk": 9}), Verdict::Deny))
        .with_scenario(Scenario::new("calm", json!({"risk": 1}), Verdict::Allow))
}

/// Priority 3: always let the fast lane through.
pub fn fast_lane() -> Principle {
    Principle::new("fast-lane", 3, "candidates in the fast lane are permitted")
        .with_scenario(Scenario::new("fast", json!({"lane": "fast"}), Verdict::Allow))
        .with_scenario(Scenario::new("slow", json!({"lane": "slow"}), Verdict::Allow))
}

/// Two independent violations, so it can be decomposed.
pub fn resource_limits() -> Principle {
    Principle::new("resource-limits", 7, "stay within cpu and memory limits")
        .with_scenario(Scenario::new("cpu", json!({"cpu": 95}), Verdict::Deny))
        .with_scenario(Scenario::new("mem", json!({"mem": 99}), Verdict::Deny))
        .with_scenario(Scenario::new("idle", json!({"cpu": 10, "mem": 10}), Verdict::Allow))
}

pub fn store_with(principles: impl IntoIterator<Item = Principle>) -> PrincipleStore {
    let store = PrincipleStore::new();
    for p in principles {
        // Fixture ids are unique.
        let _ = store.insert(p);
    }
    store
}
