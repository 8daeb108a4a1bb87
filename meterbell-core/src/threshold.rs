//! Threshold resolution and priority selection.
//!
//! A rule carries any mix of usage-value, usage-percentage and balance-value
//! thresholds (plus the legacy spellings of the first two). Evaluation runs in
//! two steps:
//!
//! 1. [`resolve`] turns one configured threshold into an absolute number in
//!    the snapshot's units and says whether the snapshot has crossed it.
//! 2. [`select_active`] reduces all crossed thresholds of a rule to at most
//!    one per [`ThresholdSide`]: the highest crossed usage bar and the lowest
//!    breached balance floor.
//!
//! Legacy kinds are folded into [`NormalizedKind`] before any comparison.

use meterbell_sdk::objects::{BalanceThreshold, EntitlementValue, ThresholdKind};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThresholdError {
    /// Nothing has been granted yet, so a percentage has no base.
    ///
    /// Callers skip the threshold instead of failing.
    #[error("no balance available")]
    NoBalanceAvailable,

    #[error("unknown threshold kind: {0}")]
    UnknownKind(String),

    #[error("entitlement value has no {0}")]
    IncompleteValue(&'static str),
}

/// Which quantity a threshold watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "threshold_side")]
pub enum ThresholdSide {
    /// Consumed amount, from absolute or percentage thresholds.
    Usage,
    /// Remaining balance.
    Balance,
}

impl ThresholdSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThresholdSide::Usage => "usage",
            ThresholdSide::Balance => "balance",
        }
    }
}

impl std::fmt::Display for ThresholdSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A threshold kind with legacy aliases resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NormalizedKind {
    UsageValue,
    UsagePercentage,
    BalanceValue,
}

impl NormalizedKind {
    pub fn of(kind: &ThresholdKind) -> Result<Self, ThresholdError> {
        match kind.canonical() {
            ThresholdKind::UsageValue => Ok(NormalizedKind::UsageValue),
            ThresholdKind::UsagePercentage => Ok(NormalizedKind::UsagePercentage),
            ThresholdKind::BalanceValue => Ok(NormalizedKind::BalanceValue),
            other => Err(ThresholdError::UnknownKind(other.as_str().to_string())),
        }
    }

    pub fn side(self) -> ThresholdSide {
        match self {
            NormalizedKind::UsageValue | NormalizedKind::UsagePercentage => ThresholdSide::Usage,
            NormalizedKind::BalanceValue => ThresholdSide::Balance,
        }
    }

    /// Precedence on an exact numeric tie within the usage side.
    fn tie_rank(self) -> u8 {
        match self {
            NormalizedKind::UsagePercentage => 1,
            NormalizedKind::UsageValue | NormalizedKind::BalanceValue => 0,
        }
    }
}

/// A threshold armed against one snapshot value.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericThreshold {
    /// The threshold as configured on the rule.
    pub threshold: BalanceThreshold,
    pub kind: NormalizedKind,
    /// Usage-equivalent amount for usage kinds, remaining balance for
    /// balance kinds.
    pub threshold_value: f64,
    pub active: bool,
}

/// Arm `threshold` against `value`.
pub fn resolve(
    threshold: &BalanceThreshold,
    value: &EntitlementValue,
) -> Result<NumericThreshold, ThresholdError> {
    let kind = NormalizedKind::of(&threshold.kind)?;
    let balance = value
        .balance
        .ok_or(ThresholdError::IncompleteValue("balance"))?;
    let usage = value.usage.ok_or(ThresholdError::IncompleteValue("usage"))?;
    let overage = value.overage.unwrap_or(0.0);

    let (threshold_value, active) = match kind {
        NormalizedKind::UsageValue => (threshold.value, threshold.value <= usage),
        NormalizedKind::UsagePercentage => {
            let total_grants = balance + usage - overage;
            if total_grants == 0.0 {
                return Err(ThresholdError::NoBalanceAvailable);
            }
            let armed = total_grants * threshold.value / 100.0;
            (armed, armed <= usage)
        }
        NormalizedKind::BalanceValue => (threshold.value, threshold.value >= balance),
    };

    Ok(NumericThreshold {
        threshold: threshold.clone(),
        kind,
        threshold_value,
        active,
    })
}

/// The winning thresholds of one rule for one snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActiveThresholds {
    pub usage: Option<BalanceThreshold>,
    pub balance: Option<BalanceThreshold>,
}

impl ActiveThresholds {
    pub fn is_empty(&self) -> bool {
        self.usage.is_none() && self.balance.is_none()
    }

    /// The non-empty sides, usage first.
    pub fn sides(&self) -> impl Iterator<Item = (ThresholdSide, &BalanceThreshold)> {
        let usage = self.usage.as_ref().map(|t| (ThresholdSide::Usage, t));
        let balance = self.balance.as_ref().map(|t| (ThresholdSide::Balance, t));
        usage.into_iter().chain(balance)
    }
}

/// Pick the active usage and balance thresholds.
///
/// Thresholds that cannot be armed because nothing has been granted yet are
/// skipped; any other resolution failure fails the whole selection.
///
/// The usage side keeps the highest armed value. On an exact tie a
/// percentage threshold beats a value threshold, regardless of configuration
/// order. The balance side keeps the lowest armed value.
pub fn select_active(
    thresholds: &[BalanceThreshold],
    value: &EntitlementValue,
) -> Result<ActiveThresholds, ThresholdError> {
    let mut usage: Option<NumericThreshold> = None;
    let mut balance: Option<NumericThreshold> = None;

    for threshold in thresholds {
        let numeric = match resolve(threshold, value) {
            Ok(numeric) => numeric,
            Err(ThresholdError::NoBalanceAvailable) => continue,
            Err(e) => return Err(e),
        };
        if !numeric.active {
            continue;
        }

        match numeric.kind.side() {
            ThresholdSide::Usage => {
                let wins = usage.as_ref().is_none_or(|current| {
                    numeric.threshold_value > current.threshold_value
                        || (numeric.threshold_value == current.threshold_value
                            && numeric.kind.tie_rank() > current.kind.tie_rank())
                });
                if wins {
                    usage = Some(numeric);
                }
            }
            ThresholdSide::Balance => {
                let wins = balance
                    .as_ref()
                    .is_none_or(|current| numeric.threshold_value < current.threshold_value);
                if wins {
                    balance = Some(numeric);
                }
            }
        }
    }

    Ok(ActiveThresholds {
        usage: usage.map(|n| n.threshold),
        balance: balance.map(|n| n.threshold),
    })
}

/// Whether two thresholds describe the same trigger once aliases are folded.
pub fn same_threshold(a: &BalanceThreshold, b: &BalanceThreshold) -> bool {
    a.canonical() == b.canonical()
}
