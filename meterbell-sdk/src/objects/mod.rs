pub mod payload;
pub mod rule;
pub mod snapshot;
pub mod threshold;

pub use payload::{
    Annotations, BalanceThresholdPayload, EntitlementValuePayloadBase, EventPayload, EventType,
};
pub use rule::{BalanceThresholdRuleConfig, EntitlementResetRuleConfig, RuleConfig};
pub use snapshot::{
    Entitlement, EntitlementType, EntitlementValue, Feature, Namespace, SnapshotAccepted,
    SnapshotEvent, Subject, UsagePeriod, ValueOperation,
};
pub use threshold::{BalanceThreshold, ThresholdKind};
