//! Entitlement snapshot events.
//!
//! A snapshot is a point-in-time measurement of an entitlement's balance,
//! usage and overage, emitted by the entitlement subsystem whenever the value
//! changes, the entitlement is deleted, or its usage period resets.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// What happened to the entitlement when the snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueOperation {
    Update,
    Delete,
    Reset,
}

impl std::fmt::Display for ValueOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueOperation::Update => write!(f, "update"),
            ValueOperation::Delete => write!(f, "delete"),
            ValueOperation::Reset => write!(f, "reset"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementType {
    Metered,
    Static,
    Boolean,
}

/// A closed usage period, `from..to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsagePeriod {
    #[serde(with = "time::serde::rfc3339")]
    pub from: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub to: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Feature {
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entitlement {
    pub id: String,
    pub feature_id: String,
    pub feature_key: String,
    pub subject_key: String,
    #[serde(rename = "type")]
    pub entitlement_type: EntitlementType,
    /// Usage is measured from this instant; absent for non-metered kinds.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub measure_usage_from: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub active_from: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub active_to: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
}

impl Entitlement {
    /// Whether the entitlement is in effect at `at`.
    ///
    /// `active_from` is inclusive, `active_to` and `deleted_at` are exclusive.
    pub fn is_active_at(&self, at: OffsetDateTime) -> bool {
        if self.active_from.is_some_and(|from| at < from) {
            return false;
        }
        if self.active_to.is_some_and(|to| at >= to) {
            return false;
        }
        if self.deleted_at.is_some_and(|deleted| at >= deleted) {
            return false;
        }
        true
    }
}

/// Remaining-this-period quantities at the instant of the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntitlementValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overage: Option<f64>,
    #[serde(default)]
    pub has_access: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
}

impl EntitlementValue {
    pub fn metered(balance: f64, usage: f64, overage: f64) -> Self {
        Self {
            balance: Some(balance),
            usage: Some(usage),
            overage: Some(overage),
            has_access: balance > 0.0,
            config: None,
        }
    }
}

/// An entitlement snapshot as delivered to the notification evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEvent {
    pub entitlement: Entitlement,
    pub namespace: Namespace,
    pub subject: Subject,
    pub feature: Feature,
    pub operation: ValueOperation,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub calculated_at: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<EntitlementValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_usage_period: Option<UsagePeriod>,
}

/// Response of the snapshot ingest endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotAccepted {
    pub namespace: String,
    pub entitlement_id: String,
}
