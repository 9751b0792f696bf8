//! Distance score: a principle's risk/ambiguity summary, recomputed from
//! its most recent validation reports.
//!
//! Over the last [`DISTANCE_WINDOW`] reports:
//!
//! ```text
//! distance = 0.5 * blocked_fraction
//!          + 0.3 * mean(1 - semantic pass rate)   // 1 when semantic never ran
//!          + 0.2 * mean(bias risk)                // 0 when bias never ran
//! ```

use acgs_types::{TierFindings, TierName, ValidationReport};

pub const DISTANCE_WINDOW: usize = 5;

/// `None` when there is nothing to score.
pub fn distance_score(reports: &[ValidationReport]) -> Option<f64> {
    let start = reports.len().saturating_sub(DISTANCE_WINDOW);
    let window = &reports[start..];
    if window.is_empty() {
        return None;
    }
    let n = window.len() as f64;
    let blocked = window.iter().filter(|r| !r.promotable()).count() as f64 / n;
    let shortfall = window
        .iter()
        .map(|r| match r.outcome(TierName::Semantic).map(|o| &o.findings) {
            Some(TierFindings::Semantic { pass_rate, .. }) => 1.0 - pass_rate,
            _ => 1.0,
        })
        .sum::<f64>()
        / n;
    let bias = window
        .iter()
        .map(|r| match r.outcome(TierName::Bias).map(|o| &o.findings) {
            Some(TierFindings::Bias { risk, .. }) => *risk,
            _ => 0.0,
        })
        .sum::<f64>()
        / n;
    Some((0.5 * blocked + 0.3 * shortfall + 0.2 * bias).clamp(0.0, 1.0))
}

/// One-line reason recorded with the transition.
pub fn describe(report: &ValidationReport) -> String {
    match report.first_blocking() {
        None => format!("attempt {} promotable", report.attempt),
        Some(o) => format!("attempt {} blocked at {} tier", report.attempt, o.tier),
    }
}
