//! Balance threshold configuration.

use serde::{Deserialize, Serialize};

/// The kind of a configured balance threshold.
///
/// `Number` and `Percent` are the legacy spellings of `UsageValue` and
/// `UsagePercentage`. Rules written before the rename still carry them, so
/// they must stay readable. [`ThresholdKind::canonical`] folds them into the
/// current kinds.
///
/// Kinds this version does not know are kept as [`ThresholdKind::Unknown`]
/// instead of failing deserialization, so one bad rule cannot make a whole
/// rule listing unreadable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ThresholdKind {
    UsageValue,
    UsagePercentage,
    BalanceValue,
    /// Legacy alias of [`ThresholdKind::UsageValue`].
    Number,
    /// Legacy alias of [`ThresholdKind::UsagePercentage`].
    Percent,
    Unknown(String),
}

impl ThresholdKind {
    pub fn as_str(&self) -> &str {
        match self {
            ThresholdKind::UsageValue => "usage_value",
            ThresholdKind::UsagePercentage => "usage_percentage",
            ThresholdKind::BalanceValue => "balance_value",
            ThresholdKind::Number => "NUMBER",
            ThresholdKind::Percent => "PERCENT",
            ThresholdKind::Unknown(raw) => raw,
        }
    }

    /// Map legacy aliases onto the kind they stand for.
    pub fn canonical(&self) -> ThresholdKind {
        match self {
            ThresholdKind::Number => ThresholdKind::UsageValue,
            ThresholdKind::Percent => ThresholdKind::UsagePercentage,
            other => other.clone(),
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, ThresholdKind::Number | ThresholdKind::Percent)
    }
}

impl From<&str> for ThresholdKind {
    fn from(value: &str) -> Self {
        match value {
            "usage_value" => ThresholdKind::UsageValue,
            "usage_percentage" => ThresholdKind::UsagePercentage,
            "balance_value" => ThresholdKind::BalanceValue,
            "NUMBER" => ThresholdKind::Number,
            "PERCENT" => ThresholdKind::Percent,
            other => ThresholdKind::Unknown(other.to_string()),
        }
    }
}

impl std::fmt::Display for ThresholdKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ThresholdKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ThresholdKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(ThresholdKind::from(s.as_str()))
    }
}

/// A configured trigger point of a balance threshold rule.
///
/// For percentage kinds `value` is a percentage of the total granted amount;
/// values above 100 are legal and fire once overage is being consumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceThreshold {
    #[serde(rename = "type")]
    pub kind: ThresholdKind,
    pub value: f64,
}

impl BalanceThreshold {
    pub fn new(kind: ThresholdKind, value: f64) -> Self {
        Self { kind, value }
    }

    pub fn usage_value(value: f64) -> Self {
        Self::new(ThresholdKind::UsageValue, value)
    }

    pub fn usage_percentage(value: f64) -> Self {
        Self::new(ThresholdKind::UsagePercentage, value)
    }

    pub fn balance_value(value: f64) -> Self {
        Self::new(ThresholdKind::BalanceValue, value)
    }

    /// The same threshold with its kind folded to the canonical spelling.
    pub fn canonical(&self) -> BalanceThreshold {
        Self::new(self.kind.canonical(), self.value)
    }
}

impl std::fmt::Display for BalanceThreshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.kind, self.value)
    }
}
