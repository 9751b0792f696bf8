#[path = "property/conflict_symmetry.rs"]
mod conflict_symmetry;

#[path = "property/enforcement_determinism.rs"]
mod enforcement_determinism;

#[path = "property/scenario_reevaluation.rs"]
mod scenario_reevaluation;
