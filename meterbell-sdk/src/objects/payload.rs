//! Notification event payloads and annotations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::snapshot::{Entitlement, EntitlementValue, Feature, Subject};
use super::threshold::BalanceThreshold;

/// Annotation key carrying the subject key.
pub const ANNOTATION_SUBJECT_KEY: &str = "event.subject.key";
/// Annotation key carrying the subject id, when the subject has one.
pub const ANNOTATION_SUBJECT_ID: &str = "event.subject.id";
/// Annotation key carrying the feature key.
pub const ANNOTATION_FEATURE_KEY: &str = "event.feature.key";
/// Annotation key carrying the feature id.
pub const ANNOTATION_FEATURE_ID: &str = "event.feature.id";
/// Annotation key carrying the balance snapshot deduplication hash.
pub const ANNOTATION_BALANCE_DEDUPE_HASH: &str = "event.balance.dedupe.hash";

/// Free-form string annotations attached to a notification event.
pub type Annotations = BTreeMap<String, String>;

/// The kind of a notification event, which is also the kind of rule that
/// produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "entitlements.balance.threshold")]
    BalanceThreshold,
    #[serde(rename = "entitlements.reset")]
    EntitlementReset,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::BalanceThreshold => "entitlements.balance.threshold",
            EventType::EntitlementReset => "entitlements.reset",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entitlements.balance.threshold" => Ok(EventType::BalanceThreshold),
            "entitlements.reset" => Ok(EventType::EntitlementReset),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

/// The entitlement state shared by every entitlement notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitlementValuePayloadBase {
    pub entitlement: Entitlement,
    pub feature: Feature,
    pub subject: Subject,
    pub value: EntitlementValue,
}

/// Payload of a balance threshold notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceThresholdPayload {
    #[serde(flatten)]
    pub base: EntitlementValuePayloadBase,
    /// The threshold that fired.
    pub threshold: BalanceThreshold,
}

/// The payload of a recorded notification event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventPayload {
    #[serde(rename = "entitlements.balance.threshold")]
    BalanceThreshold(BalanceThresholdPayload),
    #[serde(rename = "entitlements.reset")]
    EntitlementReset(EntitlementValuePayloadBase),
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::BalanceThreshold(_) => EventType::BalanceThreshold,
            EventPayload::EntitlementReset(_) => EventType::EntitlementReset,
        }
    }

    /// The entitlement state every payload carries.
    pub fn base(&self) -> &EntitlementValuePayloadBase {
        match self {
            EventPayload::BalanceThreshold(payload) => &payload.base,
            EventPayload::EntitlementReset(base) => base,
        }
    }

    pub fn as_balance_threshold(&self) -> Option<&BalanceThresholdPayload> {
        match self {
            EventPayload::BalanceThreshold(payload) => Some(payload),
            EventPayload::EntitlementReset(_) => None,
        }
    }
}
