use acgs_store::StoreError;
use acgs_types::{RuleId, TierName};

/// Errors from validation and promotion.
#[derive(Debug, thiserror::Error)]
pub enum ValidatorError {
    #[error("rule {rule_id} is not promotable: tier {tier} blocked")]
    NotPromotable { rule_id: RuleId, tier: TierName },

    #[error("report is for rule {report_rule}, not {candidate}")]
    ReportMismatch { report_rule: RuleId, candidate: RuleId },

    #[error("rule {rule_id} was validated against rule-set version {validated}; version {current} adds conflicting rule {conflicting}")]
    StaleRuleSet {
        rule_id: RuleId,
        validated: u64,
        current: u64,
        conflicting: RuleId,
    },

    #[error("invalid validator configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let e = ValidatorError::NotPromotable {
            rule_id: RuleId::new("r"),
            tier: TierName::Semantic,
        };
        assert_eq!(e.to_string(), "rule r is not promotable: tier semantic blocked");
    }
}
