//! End-to-end test: governance and enforcement outcomes feed the fidelity
//! score, and appeals push it through the alert bands.

use std::sync::Arc;

use acgs_fidelity::{Appeal, AppealSeverity, FidelityConfig, FidelityMonitor, FidelityStatus};
use acgs_kernel::{GovernanceConfig, GovernancePipeline};
use acgs_store::ActiveRuleSet;
use acgs_synthesis::TemplateOracle;
use acgs_tests::{safety_margin, store_with};
use acgs_types::{PrincipleId, Proposal, Verdict};
use chrono::Utc;
use serde_json::json;

#[tokio::test]
async fn appeals_drive_the_score_into_alert_bands() {
    let monitor = FidelityMonitor::new(FidelityConfig::default()).unwrap();
    let mut alerts = monitor.subscribe();
    let pipeline = GovernancePipeline::new(
        GovernanceConfig::default(),
        store_with([safety_margin()]),
        ActiveRuleSet::new(),
    )
    .unwrap()
    .with_oracle(Arc::new(TemplateOracle::new()))
    .with_fidelity(monitor.clone());

    let id = PrincipleId::new("safety-margin");
    assert!(pipeline.govern(&id).await.unwrap().is_promoted());

    let engine = pipeline.enforcement_engine().unwrap();
    for (i, (margin, truth)) in [(1, Verdict::Deny), (50, Verdict::Allow)].into_iter().enumerate() {
        let decision = engine
            .evaluate_current(&Proposal::new(format!("p-{}", i), json!({"margin_pct": margin})))
            .await;
        monitor.record_ground_truth(&decision, truth);
    }

    let healthy = monitor.recompute();
    assert_eq!(healthy.status, FidelityStatus::Healthy);
    assert!((healthy.components.synthesis_success - 1.0).abs() < 1e-9);
    assert!((healthy.components.enforcement_accuracy - 1.0).abs() < 1e-9);
    assert!((healthy.components.adaptation_velocity - 1.0).abs() < 1e-9);

    for _ in 0..3 {
        monitor.file_appeal(Appeal::new(AppealSeverity::High, "over-blocking").against(id.clone()));
    }
    let degraded = monitor.current().unwrap();
    assert_eq!(degraded.status, FidelityStatus::Degraded);
    let alert = alerts.try_recv().unwrap();
    assert_eq!(alert.status, FidelityStatus::Degraded);

    for _ in 0..3 {
        monitor.file_appeal(Appeal::new(AppealSeverity::High, "over-blocking").against(id.clone()));
    }
    let critical = monitor.current().unwrap();
    assert_eq!(critical.status, FidelityStatus::Critical);
    assert!(critical.freeze_until.is_some());
    assert!(monitor.freeze_active(Utc::now()));
    assert_eq!(alerts.try_recv().unwrap().status, FidelityStatus::Critical);
}
