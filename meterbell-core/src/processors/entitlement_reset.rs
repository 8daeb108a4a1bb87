//! EntitlementResetHandler processor.
//!
//! Emits one entitlement reset notification per rule and usage period when a
//! metered entitlement's usage is reset.

use crate::entities::notification_event::{ListEvents, NotificationEvent};
use crate::entities::notification_rule::{ListRules, NotificationRule};
use crate::processors::emitter::EventEmitter;
use crate::processors::error::{EvaluationError, HandlerError, RuleError};
use crate::processors::{NotificationStore, eligible_value, rule_applies};
use kanau::processor::Processor;
use meterbell_sdk::objects::{EntitlementValue, EventType, SnapshotEvent, ValueOperation};
use time::OffsetDateTime;
use tracing::{debug, warn};

/// Notifies entitlement reset rules about usage resets.
#[derive(Debug, Clone)]
pub struct EntitlementResetHandler<S> {
    store: S,
    emitter: EventEmitter<S>,
}

impl<S: NotificationStore> EntitlementResetHandler<S> {
    pub fn new(store: S) -> Self {
        Self {
            emitter: EventEmitter::new(store.clone()),
            store,
        }
    }

    async fn notify_rule(
        &self,
        rule: &NotificationRule,
        snapshot: &SnapshotEvent,
        value: &EntitlementValue,
    ) -> Result<Option<NotificationEvent>, EvaluationError> {
        let existing = <S as Processor<ListEvents>>::process(
            &self.store,
            ListEvents {
                namespace: snapshot.namespace.id.clone(),
                period: snapshot.current_usage_period,
                rule_ids: vec![rule.id.clone()],
                entitlement_ids: vec![snapshot.entitlement.id.clone()],
                event_type: Some(EventType::EntitlementReset),
                limit: Some(1),
                ..Default::default()
            },
        )
        .await?;
        if !existing.is_empty() {
            debug!(rule_id = %rule.id, "Reset already notified for this period");
            return Ok(None);
        }

        Ok(self.emitter.entitlement_reset(rule, snapshot, value).await?)
    }
}

impl<S: NotificationStore> Processor<SnapshotEvent> for EntitlementResetHandler<S> {
    type Output = Vec<NotificationEvent>;
    type Error = HandlerError;
    #[tracing::instrument(
        skip_all,
        err,
        name = "EntitlementResetHandler",
        fields(namespace = %snapshot.namespace.id, entitlement_id = %snapshot.entitlement.id)
    )]
    async fn process(
        &self,
        snapshot: SnapshotEvent,
    ) -> Result<Vec<NotificationEvent>, HandlerError> {
        if snapshot.operation != ValueOperation::Reset {
            return Ok(Vec::new());
        }
        let value = match eligible_value(&snapshot, OffsetDateTime::now_utc()) {
            Ok(value) => value,
            Err(reason) => {
                debug!(reason, "Snapshot skipped");
                return Ok(Vec::new());
            }
        };

        let rules = <S as Processor<ListRules>>::process(
            &self.store,
            ListRules {
                namespace: snapshot.namespace.id.clone(),
                event_type: EventType::EntitlementReset,
            },
        )
        .await
        .map_err(|source| HandlerError::ListRules {
            event_type: EventType::EntitlementReset,
            source,
        })?;

        let mut emitted = Vec::new();
        let mut errors = Vec::new();
        for rule in rules.iter().filter(|rule| rule_applies(rule, &snapshot)) {
            match self.notify_rule(rule, &snapshot, value).await {
                Ok(event) => emitted.extend(event),
                Err(source) => {
                    warn!(rule_id = %rule.id, error = %source, "Failed to notify reset");
                    errors.push(RuleError {
                        rule_id: rule.id.clone(),
                        entitlement_id: snapshot.entitlement.id.clone(),
                        source,
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(emitted)
        } else {
            Err(HandlerError::Rules(errors))
        }
    }
}
