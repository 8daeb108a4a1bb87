//! Snapshot handlers and the consumer that drives them.
//!
//! - `BalanceThresholdHandler`: Receives a snapshot, emits balance threshold notifications
//! - `EntitlementResetHandler`: Receives a reset snapshot, emits reset notifications
//! - `SnapshotConsumer`: Receives `SnapshotEnvelope`, runs both handlers, redelivers on failure

pub mod balance_threshold;
pub mod consumer;
pub mod emitter;
pub mod entitlement_reset;
pub mod error;

pub use balance_threshold::BalanceThresholdHandler;
pub use consumer::{DispatchError, SnapshotConsumer, calculate_retry_delay};
pub use emitter::EventEmitter;
pub use entitlement_reset::EntitlementResetHandler;
pub use error::{EvaluationError, HandlerError, RuleError};

use crate::entities::notification_event::{CreateEvent, ListEvents, NotificationEvent};
use crate::entities::notification_rule::{ListRules, NotificationRule};
use kanau::processor::Processor;
use meterbell_sdk::objects::{EntitlementType, EntitlementValue, SnapshotEvent, ValueOperation};
use time::OffsetDateTime;

/// Everything the handlers need from storage.
///
/// Implemented by `DatabaseProcessor` for Postgres.
pub trait NotificationStore:
    Processor<ListRules, Output = Vec<NotificationRule>, Error = sqlx::Error>
    + Processor<ListEvents, Output = Vec<NotificationEvent>, Error = sqlx::Error>
    + Processor<CreateEvent, Output = Option<NotificationEvent>, Error = sqlx::Error>
    + Clone
    + Send
    + Sync
    + 'static
{
}

impl<T> NotificationStore for T where
    T: Processor<ListRules, Output = Vec<NotificationRule>, Error = sqlx::Error>
        + Processor<ListEvents, Output = Vec<NotificationEvent>, Error = sqlx::Error>
        + Processor<CreateEvent, Output = Option<NotificationEvent>, Error = sqlx::Error>
        + Clone
        + Send
        + Sync
        + 'static
{
}

/// Return the value of a snapshot worth evaluating, or why it is not.
///
/// Only metered entitlements that are active at `now` and carry both a
/// balance and a usage are evaluated, on update and reset operations.
pub(crate) fn eligible_value(
    snapshot: &SnapshotEvent,
    now: OffsetDateTime,
) -> Result<&EntitlementValue, &'static str> {
    if snapshot.entitlement.entitlement_type != EntitlementType::Metered {
        return Err("entitlement is not metered");
    }
    if !matches!(
        snapshot.operation,
        ValueOperation::Update | ValueOperation::Reset
    ) {
        return Err("operation is not update or reset");
    }
    if !snapshot.entitlement.is_active_at(now) {
        return Err("entitlement is not active");
    }
    let value = snapshot.value.as_ref().ok_or("snapshot has no value")?;
    if value.balance.is_none() || value.usage.is_none() {
        return Err("value has no balance or usage");
    }
    Ok(value)
}

/// Whether a rule should see snapshots of this feature at all.
pub(crate) fn rule_applies(rule: &NotificationRule, snapshot: &SnapshotEvent) -> bool {
    rule.has_enabled_channels()
        && rule
            .config
            .matches_feature(&snapshot.feature.id, &snapshot.feature.key)
}
