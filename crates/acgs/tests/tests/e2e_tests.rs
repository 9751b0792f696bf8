#[path = "e2e/safety_margin.rs"]
mod safety_margin;

#[path = "e2e/priority_conflict.rs"]
mod priority_conflict;

#[path = "e2e/bias_bands.rs"]
mod bias_bands;

#[path = "e2e/recovery_budget.rs"]
mod recovery_budget;

#[path = "e2e/atomic_promotion.rs"]
mod atomic_promotion;

#[path = "e2e/fail_safe.rs"]
mod fail_safe;

#[path = "e2e/fidelity_loop.rs"]
mod fidelity_loop;
