//! Notification rule configuration.

use serde::{Deserialize, Serialize};

use super::payload::EventType;
use super::threshold::BalanceThreshold;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceThresholdRuleConfig {
    pub thresholds: Vec<BalanceThreshold>,
    /// Feature ids or keys the rule is limited to. Empty means every feature.
    #[serde(default)]
    pub features: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitlementResetRuleConfig {
    /// Feature ids or keys the rule is limited to. Empty means every feature.
    #[serde(default)]
    pub features: Vec<String>,
}

/// Type-specific configuration of a notification rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RuleConfig {
    #[serde(rename = "entitlements.balance.threshold")]
    BalanceThreshold(BalanceThresholdRuleConfig),
    #[serde(rename = "entitlements.reset")]
    EntitlementReset(EntitlementResetRuleConfig),
}

impl RuleConfig {
    pub fn event_type(&self) -> EventType {
        match self {
            RuleConfig::BalanceThreshold(_) => EventType::BalanceThreshold,
            RuleConfig::EntitlementReset(_) => EventType::EntitlementReset,
        }
    }

    pub fn features(&self) -> &[String] {
        match self {
            RuleConfig::BalanceThreshold(config) => &config.features,
            RuleConfig::EntitlementReset(config) => &config.features,
        }
    }

    /// Whether the rule's feature filter admits a feature.
    pub fn matches_feature(&self, feature_id: &str, feature_key: &str) -> bool {
        let features = self.features();
        features.is_empty()
            || features
                .iter()
                .any(|f| f.as_str() == feature_id || f.as_str() == feature_key)
    }
}
