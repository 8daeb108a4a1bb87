//! Building and recording notification events.

use crate::entities::notification_event::{CreateEvent, NotificationEvent};
use crate::entities::notification_rule::NotificationRule;
use crate::processors::NotificationStore;
use crate::threshold::ThresholdSide;
use kanau::processor::Processor;
use meterbell_sdk::objects::payload::{
    ANNOTATION_BALANCE_DEDUPE_HASH, ANNOTATION_FEATURE_ID, ANNOTATION_FEATURE_KEY,
    ANNOTATION_SUBJECT_ID, ANNOTATION_SUBJECT_KEY,
};
use meterbell_sdk::objects::{
    Annotations, BalanceThreshold, BalanceThresholdPayload, EntitlementValue,
    EntitlementValuePayloadBase, EventPayload, SnapshotEvent,
};
use tracing::{debug, info};

/// The entitlement state of a snapshot, as carried by every payload.
pub fn payload_base(
    snapshot: &SnapshotEvent,
    value: &EntitlementValue,
) -> EntitlementValuePayloadBase {
    EntitlementValuePayloadBase {
        entitlement: snapshot.entitlement.clone(),
        feature: snapshot.feature.clone(),
        subject: snapshot.subject.clone(),
        value: value.clone(),
    }
}

/// Annotations identifying the subject and feature of a notification, and
/// its dedup key when it has one.
pub fn annotations(snapshot: &SnapshotEvent, dedup_hash: Option<&str>) -> Annotations {
    let mut annotations = Annotations::new();
    annotations.insert(
        ANNOTATION_SUBJECT_KEY.to_string(),
        snapshot.subject.key.clone(),
    );
    if let Some(subject_id) = &snapshot.subject.id {
        annotations.insert(ANNOTATION_SUBJECT_ID.to_string(), subject_id.clone());
    }
    annotations.insert(
        ANNOTATION_FEATURE_KEY.to_string(),
        snapshot.feature.key.clone(),
    );
    annotations.insert(ANNOTATION_FEATURE_ID.to_string(), snapshot.feature.id.clone());
    if let Some(hash) = dedup_hash {
        annotations.insert(ANNOTATION_BALANCE_DEDUPE_HASH.to_string(), hash.to_string());
    }
    annotations
}

/// Records notification events for the handlers.
#[derive(Debug, Clone)]
pub struct EventEmitter<S> {
    store: S,
}

impl<S: NotificationStore> EventEmitter<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Record a balance threshold notification.
    ///
    /// Returns `None` when the store already holds this key and threshold.
    pub async fn balance_threshold(
        &self,
        rule: &NotificationRule,
        snapshot: &SnapshotEvent,
        value: &EntitlementValue,
        threshold: &BalanceThreshold,
        side: ThresholdSide,
        dedup_hash: String,
    ) -> Result<Option<NotificationEvent>, sqlx::Error> {
        let payload = EventPayload::BalanceThreshold(BalanceThresholdPayload {
            base: payload_base(snapshot, value),
            threshold: threshold.clone(),
        });
        self.create(CreateEvent {
            namespace: snapshot.namespace.id.clone(),
            rule_id: rule.id.clone(),
            payload,
            annotations: annotations(snapshot, Some(&dedup_hash)),
            dedup_hash: Some(dedup_hash),
            threshold_side: Some(side),
            channels: rule.enabled_channels.clone(),
        })
        .await
    }

    /// Record an entitlement reset notification.
    pub async fn entitlement_reset(
        &self,
        rule: &NotificationRule,
        snapshot: &SnapshotEvent,
        value: &EntitlementValue,
    ) -> Result<Option<NotificationEvent>, sqlx::Error> {
        self.create(CreateEvent {
            namespace: snapshot.namespace.id.clone(),
            rule_id: rule.id.clone(),
            payload: EventPayload::EntitlementReset(payload_base(snapshot, value)),
            annotations: annotations(snapshot, None),
            dedup_hash: None,
            threshold_side: None,
            channels: rule.enabled_channels.clone(),
        })
        .await
    }

    async fn create(&self, cmd: CreateEvent) -> Result<Option<NotificationEvent>, sqlx::Error> {
        let rule_id = cmd.rule_id.clone();
        let event_type = cmd.payload.event_type();
        let created = <S as Processor<CreateEvent>>::process(&self.store, cmd).await?;
        match &created {
            Some(event) => info!(
                event_id = %event.id,
                rule_id = %rule_id,
                event_type = %event_type,
                "Notification event created"
            ),
            None => debug!(
                rule_id = %rule_id,
                event_type = %event_type,
                "Notification event already recorded"
            ),
        }
        Ok(created)
    }
}
