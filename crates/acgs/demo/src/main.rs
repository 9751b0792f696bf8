#![deny(unsafe_code)]
//! ACGS demo binary.
//!
//! Runs a self-contained walk through the governance loop:
//! 1. Rule synthesis and tiered validation for three principles
//! 2. Real-time enforcement, including a priority 9 vs priority 3 conflict
//! 3. Fidelity scoring from ground truth and appeals
//!
//! No external services required. Set `ACGS_CONFIG` to a TOML file to run
//! with a custom governance configuration.

use std::sync::Arc;

use acgs_enforcement::PgcEngine;
use acgs_fidelity::{Appeal, AppealSeverity, FidelityConfig, FidelityMonitor};
use acgs_kernel::{GovernanceConfig, GovernanceOutcome, GovernancePipeline};
use acgs_store::{ActiveRuleSet, InMemoryAuditSink, PrincipleStore};
use acgs_synthesis::{FixtureOracle, TemplateOracle};
use acgs_types::{Formalizability, Principle, PrincipleId, Proposal, Scenario, Verdict};
use serde_json::json;
use tracing::debug;
use tracing_subscriber::EnvFilter;

// ── Formatting Helpers ──────────────────────────────────────────────────

const BANNER: &str = r#"
 ╔═══════════════════════════════════════════════════════════════╗
 ║       Constitutional Governance  --  Demo                    ║
 ║                                                              ║
 ║   Principles in, validated rules out, enforced per           ║
 ║   proposal with fail-safe deny.                              ║
 ╚═══════════════════════════════════════════════════════════════╝
"#;

const FAST_LANE_RULE: &str =
    r#"(rule fast-lane (when (== lane "fast")) (then allow "fast lane is always permitted"))"#;

fn section(title: &str) {
    let width: usize = 60;
    let pad = width.saturating_sub(title.len() + 4);
    let left = pad / 2;
    let right = pad - left;
    println!();
    println!(" ┌{}┐", "─".repeat(width));
    println!(" │{}  {}  {}│", " ".repeat(left), title, " ".repeat(right));
    println!(" └{}┘", "─".repeat(width));
}

fn ok(msg: &str) {
    println!("   [OK]  {}", msg);
}

fn info(msg: &str) {
    println!("   [--]  {}", msg);
}

fn warn(msg: &str) {
    println!("   [!!]  {}", msg);
}

// ── Main ────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    println!("{}", BANNER);

    if let Err(e) = run_demo().await {
        eprintln!();
        eprintln!("   [FATAL]  Demo failed: {:#}", e);
        std::process::exit(1);
    }

    println!();
    println!(" ════════════════════════════════════════════════════════════════");
    println!("  Demo complete.  All phases succeeded.");
    println!(" ════════════════════════════════════════════════════════════════");
    println!();
}

fn seed_principles() -> Vec<Principle> {
    vec![
        Principle::new("safety-margin", 9, "never accept a candidate whose safety margin is below 20 percent")
            .with_formalizability(Formalizability::FormallyVerifiable)
            .with_formal_spec("(< margin_pct 20)")
            .with_scenario(Scenario::new("thin", json!({"margin_pct": 5}), Verdict::Deny))
            .with_scenario(Scenario::new("comfortable", json!({"margin_pct": 45}), Verdict::Allow))
            .safety_critical(),
        Principle::new("risk-limit", 9, "reject candidates with risk above 5")
            .with_formal_spec("(> risk 5)")
            .with_scenario(Scenario::new("risky", json!({"risk": 9}), Verdict::Deny))
            .with_scenario(Scenario::new("calm", json!({"risk": 1}), Verdict::Allow)),
        Principle::new("fast-lane", 3, "candidates in the fast lane are permitted")
            .with_scenario(Scenario::new("fast", json!({"lane": "fast"}), Verdict::Allow))
            .with_scenario(Scenario::new("slow", json!({"lane": "slow"}), Verdict::Allow)),
    ]
}

fn load_config() -> anyhow::Result<GovernanceConfig> {
    match std::env::var("ACGS_CONFIG") {
        Ok(path) => {
            let config = GovernanceConfig::load(&path)?;
            info(&format!("configuration loaded from {}", path));
            Ok(config)
        }
        Err(_) => Ok(GovernanceConfig::default()),
    }
}

fn report(outcome: &GovernanceOutcome) {
    match outcome {
        GovernanceOutcome::Promoted {
            principle_id,
            rule_id,
            version,
            mode,
            attempts,
            ..
        } => ok(&format!(
            "{} -> {} promoted {} at version {} after {} attempt(s)",
            principle_id, rule_id, mode, version, attempts
        )),
        GovernanceOutcome::Escalated {
            principle_id,
            fault,
            attempts,
            ..
        } => warn(&format!(
            "{} escalated to human review after {} attempt(s): {}",
            principle_id, attempts, fault
        )),
        GovernanceOutcome::Cancelled { principle_id, attempts } => warn(&format!(
            "{} cancelled after {} attempt(s)",
            principle_id, attempts
        )),
    }
}

async fn decide(engine: &PgcEngine, id: &str, payload: serde_json::Value) -> acgs_types::EnforcementDecision {
    let decision = engine.evaluate_current(&Proposal::new(id, payload.clone())).await;
    let line = format!(
        "{} {}  ->  {}  ({}us, version {})",
        id,
        payload,
        decision.explanation(),
        decision.latency_us,
        decision.rule_set_version
    );
    if decision.is_allowed() {
        ok(&line);
    } else {
        warn(&line);
    }
    for conflict in &decision.conflicts {
        info(&format!(
            "conflict: {} (priority {}) over {} (priority {})",
            conflict.winner, conflict.winner_priority, conflict.loser, conflict.loser_priority
        ));
    }
    decision
}

async fn run_demo() -> anyhow::Result<()> {
    // ── Phase A: Synthesis and Validation ───────────────────────────
    section("Phase A: Synthesis and Validation");

    let config = load_config()?;
    info(&format!(
        "retry_budget={}  oracle_timeout_ms={}",
        config.recovery.retry_budget, config.synthesis.oracle_timeout_ms
    ));

    let principles = PrincipleStore::new();
    for p in seed_principles() {
        principles.insert(p)?;
    }
    debug!(principles = principles.len(), "principle store seeded");
    let rule_set = ActiveRuleSet::new();
    let audit = InMemoryAuditSink::new();
    let monitor = FidelityMonitor::new(FidelityConfig::default())?;

    let templated = GovernancePipeline::new(config.clone(), principles.clone(), rule_set.clone())?
        .with_oracle(Arc::new(TemplateOracle::new()))
        .with_audit(Arc::new(audit.clone()))
        .with_fidelity(monitor.clone());
    let replayed = GovernancePipeline::new(config, principles.clone(), rule_set.clone())?
        .with_oracle(Arc::new(FixtureOracle::new("fixture").with_reply(FAST_LANE_RULE, 0.8)))
        .with_audit(Arc::new(audit.clone()))
        .with_fidelity(monitor.clone());

    for id in ["safety-margin", "risk-limit"] {
        report(&templated.govern(&PrincipleId::new(id)).await?);
    }
    report(&replayed.govern(&PrincipleId::new("fast-lane")).await?);

    for r in audit.reports() {
        info(&format!(
            "report {}  rule={}  promotable={}",
            r.principle_id,
            r.rule_id,
            r.promotable()
        ));
    }
    let snapshot = rule_set.snapshot();
    ok(&format!("{} active rule(s) at version {}", snapshot.len(), snapshot.version));

    // ── Phase B: Enforcement ────────────────────────────────────────
    section("Phase B: Real-time Enforcement");

    let engine = templated.enforcement_engine()?;
    let mut decisions = Vec::new();
    decisions.push((decide(&engine, "cand-1", json!({"margin_pct": 12})).await, Verdict::Deny));
    decisions.push((decide(&engine, "cand-2", json!({"margin_pct": 35, "risk": 2})).await, Verdict::Allow));
    decisions.push((decide(&engine, "cand-3", json!({"risk": 9, "lane": "fast"})).await, Verdict::Deny));
    decisions.push((decide(&engine, "cand-4", json!({"risk": 1, "lane": "fast"})).await, Verdict::Allow));
    decide(&engine, "cand-5", json!({"margin_pct": 12})).await;

    let stats = engine.stats();
    info(&format!(
        "evaluations={}  denied={}  cache_hit_rate={:.2}  runtime_conflicts={}  max_latency_us={}",
        stats.evaluations,
        stats.denied,
        stats.cache_hit_rate(),
        stats.runtime_conflicts,
        stats.max_latency_us
    ));

    // ── Phase C: Fidelity ───────────────────────────────────────────
    section("Phase C: Fidelity Monitor");

    for (decision, truth) in &decisions {
        monitor.record_ground_truth(decision, *truth);
    }
    let score = monitor.recompute();
    ok(&format!("fidelity {:.3}  status={:?}", score.score, score.status));
    info(&format!(
        "synthesis={:.2}  accuracy={:.2}  velocity={:.2}  satisfaction={:.2}",
        score.components.synthesis_success,
        score.components.enforcement_accuracy,
        score.components.adaptation_velocity,
        score.components.stakeholder_satisfaction
    ));

    monitor.file_appeal(
        Appeal::new(AppealSeverity::Medium, "fast lane blocked during incident")
            .against(PrincipleId::new("risk-limit")),
    );
    let after = monitor.recompute();
    let line = format!(
        "after appeal: fidelity {:.3}  penalty {:.3}  status={:?}",
        after.score, after.appeal_penalty, after.status
    );
    if after.freeze_until.is_some() {
        warn(&line);
    } else {
        info(&line);
    }

    Ok(())
}
