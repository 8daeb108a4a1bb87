//! BalanceThresholdHandler processor.
//!
//! The BalanceThresholdHandler is responsible for:
//! - Filtering out snapshots that cannot cross a threshold
//! - Listing the namespace's balance threshold rules that apply to the feature
//! - Selecting the active usage and balance threshold of each rule
//! - Comparing each against the last notification of the same key and side
//! - Recording a new notification when the active threshold changed
//!
//! Repeated snapshots within one usage period therefore notify once per
//! threshold tier.

use crate::dedupe::balance_event_dedup_hash;
use crate::entities::notification_event::{ListEvents, NotificationEvent};
use crate::entities::notification_rule::{ListRules, NotificationRule};
use crate::processors::emitter::EventEmitter;
use crate::processors::error::{EvaluationError, HandlerError, RuleError};
use crate::processors::{NotificationStore, eligible_value, rule_applies};
use crate::threshold::{ThresholdError, ThresholdSide, resolve, same_threshold, select_active};
use kanau::processor::Processor;
use meterbell_sdk::objects::{BalanceThreshold, EntitlementValue, EventType, SnapshotEvent};
use time::OffsetDateTime;
use tracing::{debug, warn};

/// Evaluates balance threshold rules against entitlement snapshots.
#[derive(Debug, Clone)]
pub struct BalanceThresholdHandler<S> {
    store: S,
    emitter: EventEmitter<S>,
}

impl<S: NotificationStore> BalanceThresholdHandler<S> {
    pub fn new(store: S) -> Self {
        Self {
            emitter: EventEmitter::new(store.clone()),
            store,
        }
    }

    async fn evaluate_rule(
        &self,
        rule: &NotificationRule,
        snapshot: &SnapshotEvent,
        value: &EntitlementValue,
    ) -> Result<Vec<NotificationEvent>, EvaluationError> {
        let Some(config) = rule.balance_threshold_config() else {
            return Ok(Vec::new());
        };
        let active = select_active(&config.thresholds, value)?;
        if active.is_empty() {
            debug!(rule_id = %rule.id, "No active threshold");
            return Ok(Vec::new());
        }

        let dedup_hash = balance_event_dedup_hash(snapshot, &rule.id)?;
        let mut emitted = Vec::new();

        for (side, threshold) in active.sides() {
            let last = <S as Processor<ListEvents>>::process(
                &self.store,
                ListEvents {
                    namespace: snapshot.namespace.id.clone(),
                    period: snapshot.current_usage_period,
                    dedup_hashes: vec![dedup_hash.clone()],
                    threshold_side: Some(side),
                    limit: Some(1),
                    ..Default::default()
                },
            )
            .await?
            .into_iter()
            .next();

            if !threshold_changed(last.as_ref(), threshold)? {
                debug!(
                    rule_id = %rule.id,
                    side = %side,
                    threshold = %threshold,
                    "Threshold already notified"
                );
                continue;
            }

            let created = self
                .emitter
                .balance_threshold(rule, snapshot, value, threshold, side, dedup_hash.clone())
                .await?;
            emitted.extend(created);
        }

        Ok(emitted)
    }
}

/// Whether `threshold` differs from the one the last notification fired on.
///
/// A last event that is not a balance threshold notification is treated as
/// no notification at all.
fn threshold_changed(
    last: Option<&NotificationEvent>,
    threshold: &BalanceThreshold,
) -> Result<bool, ThresholdError> {
    let Some(last) = last else {
        return Ok(true);
    };
    let Some(payload) = last.payload.as_balance_threshold() else {
        warn!(
            event_id = %last.id,
            event_type = %last.event_type,
            "Last event for dedup key is not a balance threshold event"
        );
        return Ok(true);
    };

    match resolve(&payload.threshold, &payload.base.value) {
        Ok(_) => Ok(!same_threshold(&payload.threshold, threshold)),
        Err(ThresholdError::NoBalanceAvailable) => Ok(false),
        Err(e) => Err(e),
    }
}

impl<S: NotificationStore> Processor<SnapshotEvent> for BalanceThresholdHandler<S> {
    type Output = Vec<NotificationEvent>;
    type Error = HandlerError;
    #[tracing::instrument(
        skip_all,
        err,
        name = "BalanceThresholdHandler",
        fields(namespace = %snapshot.namespace.id, entitlement_id = %snapshot.entitlement.id)
    )]
    async fn process(
        &self,
        snapshot: SnapshotEvent,
    ) -> Result<Vec<NotificationEvent>, HandlerError> {
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
                event_type: EventType::BalanceThreshold,
            },
        )
        .await
        .map_err(|source| HandlerError::ListRules {
            event_type: EventType::BalanceThreshold,
            source,
        })?;

        let mut emitted = Vec::new();
        let mut errors = Vec::new();

        let applicable = rules.iter().filter(|rule| {
            rule_applies(rule, &snapshot)
                && rule
                    .balance_threshold_config()
                    .is_some_and(|config| !config.thresholds.is_empty())
        });
        for rule in applicable {
            match self.evaluate_rule(rule, &snapshot, value).await {
                Ok(events) => emitted.extend(events),
                Err(source) => {
                    warn!(rule_id = %rule.id, error = %source, "Failed to evaluate rule");
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStore, balance_rule, live_snapshot};
    use meterbell_sdk::objects::{
        EntitlementValuePayloadBase, EventPayload, ThresholdKind, ValueOperation,
    };
    use time::Duration;

    fn handler(
        rules: Vec<NotificationRule>,
    ) -> (BalanceThresholdHandler<MemoryStore>, MemoryStore) {
        let store = MemoryStore::with_rules(rules);
        (BalanceThresholdHandler::new(store.clone()), store)
    }

    fn thresholds() -> Vec<BalanceThreshold> {
        vec![
            BalanceThreshold::usage_percentage(50.0),
            BalanceThreshold::usage_percentage(80.0),
            BalanceThreshold::usage_percentage(100.0),
        ]
    }

    #[tokio::test]
    async fn test_repeated_snapshots_notify_once() {
        let (handler, store) = handler(vec![balance_rule("rule-1", thresholds())]);
        let snapshot = live_snapshot(45.0, 55.0);

        let first = handler.process(snapshot.clone()).await.unwrap();
        assert_eq!(first.len(), 1);
        let payload = first[0].payload.as_balance_threshold().unwrap();
        assert_eq!(payload.threshold, BalanceThreshold::usage_percentage(50.0));
        assert_eq!(
            first[0].dedup_hash.as_deref(),
            Some(balance_event_dedup_hash(&snapshot, "rule-1").unwrap().as_str())
        );

        for _ in 0..3 {
            assert!(handler.process(snapshot.clone()).await.unwrap().is_empty());
        }
        assert_eq!(store.events().len(), 1);
        assert_eq!(store.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_next_tier_notifies_again() {
        let (handler, store) = handler(vec![balance_rule("rule-1", thresholds())]);
        let mut snapshot = live_snapshot(45.0, 55.0);
        handler.process(snapshot.clone()).await.unwrap();

        snapshot.value = Some(EntitlementValue::metered(15.0, 85.0, 0.0));
        let second = handler.process(snapshot.clone()).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(
            second[0].payload.as_balance_threshold().unwrap().threshold,
            BalanceThreshold::usage_percentage(80.0)
        );

        // still within the 80% tier
        snapshot.value = Some(EntitlementValue::metered(10.0, 90.0, 0.0));
        assert!(handler.process(snapshot).await.unwrap().is_empty());
        assert_eq!(store.events().len(), 2);
    }

    #[tokio::test]
    async fn test_below_every_threshold_is_quiet() {
        let (handler, store) = handler(vec![balance_rule("rule-1", thresholds())]);
        assert!(handler.process(live_snapshot(70.0, 30.0)).await.unwrap().is_empty());
        assert_eq!(store.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_usage_and_balance_sides_notify_independently() {
        let rule = balance_rule(
            "rule-1",
            vec![
                BalanceThreshold::usage_value(20.0),
                BalanceThreshold::balance_value(10.0),
            ],
        );
        let (handler, store) = handler(vec![rule]);
        let snapshot = live_snapshot(10.0, 20.0);

        let emitted = handler.process(snapshot.clone()).await.unwrap();
        let fired: Vec<_> = emitted
            .iter()
            .map(|e| e.payload.as_balance_threshold().unwrap().threshold.clone())
            .collect();
        assert_eq!(
            fired,
            vec![
                BalanceThreshold::usage_value(20.0),
                BalanceThreshold::balance_value(10.0)
            ]
        );

        // both sides share one key but are compared separately
        assert!(handler.process(snapshot).await.unwrap().is_empty());
        assert_eq!(store.events().len(), 2);
    }

    #[tokio::test]
    async fn test_legacy_alias_matches_recorded_threshold() {
        let (handler, store) = handler(vec![balance_rule(
            "rule-1",
            vec![BalanceThreshold::new(ThresholdKind::Percent, 50.0)],
        )]);
        let snapshot = live_snapshot(45.0, 55.0);
        assert_eq!(handler.process(snapshot.clone()).await.unwrap().len(), 1);

        // the rule is rewritten to the canonical spelling
        store.set_rules(vec![balance_rule(
            "rule-1",
            vec![BalanceThreshold::usage_percentage(50.0)],
        )]);
        assert!(handler.process(snapshot).await.unwrap().is_empty());
        assert_eq!(store.events().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_kind_fails_only_its_rule() {
        let broken = balance_rule(
            "broken",
            vec![BalanceThreshold::new(
                ThresholdKind::Unknown("credits".to_string()),
                1.0,
            )],
        );
        let healthy = balance_rule("healthy", vec![BalanceThreshold::usage_value(10.0)]);
        let (handler, store) = handler(vec![broken, healthy]);

        let err = handler.process(live_snapshot(45.0, 55.0)).await.unwrap_err();
        let errors = err.rule_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].rule_id, "broken");
        assert_eq!(errors[0].entitlement_id, "ent-1");
        assert!(!err.is_retryable());

        let events = store.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].rule_id, "healthy");
    }

    #[tokio::test]
    async fn test_storage_failure_is_returned() {
        let (handler, store) = handler(vec![balance_rule("rule-1", thresholds())]);
        store.fail_next(1);
        let err = handler.process(live_snapshot(45.0, 55.0)).await.unwrap_err();
        assert!(matches!(err, HandlerError::ListRules { .. }));
        assert!(err.is_retryable());

        // the event lookup fails after rules were listed
        store.fail_after(1, 1);
        let err = handler.process(live_snapshot(45.0, 55.0)).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(
            err.rule_errors()[0].source,
            EvaluationError::Database(_)
        ));
        assert!(store.events().is_empty());
    }

    #[tokio::test]
    async fn test_non_threshold_last_event_is_ignored() {
        let (handler, store) = handler(vec![balance_rule("rule-1", thresholds())]);
        let snapshot = live_snapshot(45.0, 55.0);
        let dedup_hash = balance_event_dedup_hash(&snapshot, "rule-1").unwrap();

        let mut foreign = handler.process(snapshot.clone()).await.unwrap().remove(0);
        store.clear_events();
        foreign.payload = EventPayload::EntitlementReset(EntitlementValuePayloadBase {
            entitlement: snapshot.entitlement.clone(),
            feature: snapshot.feature.clone(),
            subject: snapshot.subject.clone(),
            value: EntitlementValue::metered(45.0, 55.0, 0.0),
        });
        foreign.dedup_hash = Some(dedup_hash);
        store.seed_event_on_side(foreign, ThresholdSide::Usage);

        let emitted = handler.process(snapshot).await.unwrap();
        assert_eq!(emitted.len(), 1);
    }

    #[tokio::test]
    async fn test_recorded_threshold_without_grants_is_not_renotified() {
        let (handler, store) = handler(vec![balance_rule(
            "rule-1",
            vec![
                BalanceThreshold::usage_percentage(50.0),
                BalanceThreshold::usage_value(0.0),
            ],
        )]);
        let snapshot = live_snapshot(45.0, 55.0);
        let mut recorded = handler.process(snapshot.clone()).await.unwrap().remove(0);
        store.clear_events();

        // the recorded value had nothing granted, so its threshold cannot be armed
        if let EventPayload::BalanceThreshold(payload) = &mut recorded.payload {
            payload.base.value = EntitlementValue::metered(0.0, 0.0, 0.0);
            payload.threshold = BalanceThreshold::usage_percentage(100.0);
        }
        store.seed_event_on_side(recorded, ThresholdSide::Usage);

        assert!(handler.process(snapshot).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ineligible_snapshots_are_skipped() {
        let (handler, store) = handler(vec![balance_rule("rule-1", thresholds())]);

        let mut deleted = live_snapshot(10.0, 90.0);
        deleted.operation = ValueOperation::Delete;
        assert!(handler.process(deleted).await.unwrap().is_empty());

        let mut inactive = live_snapshot(10.0, 90.0);
        inactive.entitlement.active_to = Some(OffsetDateTime::now_utc() - Duration::hours(1));
        assert!(handler.process(inactive).await.unwrap().is_empty());

        assert_eq!(store.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_new_period_notifies_again() {
        let (handler, store) = handler(vec![balance_rule("rule-1", thresholds())]);
        let mut snapshot = live_snapshot(45.0, 55.0);
        handler.process(snapshot.clone()).await.unwrap();

        // a period starting later still contains now but has its own key
        if let Some(period) = snapshot.current_usage_period.as_mut() {
            period.from += Duration::hours(1);
        }
        assert_eq!(handler.process(snapshot).await.unwrap().len(), 1);
        assert_eq!(store.events().len(), 2);
    }

    #[tokio::test]
    async fn test_rules_without_channels_or_for_other_features_are_skipped() {
        let mut muted = balance_rule("muted", thresholds());
        muted.enabled_channels.clear();
        let mut other = balance_rule("other", thresholds());
        if let meterbell_sdk::objects::RuleConfig::BalanceThreshold(config) = &mut other.config {
            config.features = vec!["storage".to_string()];
        }
        let (handler, store) = handler(vec![muted, other]);
        assert!(handler.process(live_snapshot(10.0, 90.0)).await.unwrap().is_empty());
        assert_eq!(store.create_calls(), 0);
    }
}
