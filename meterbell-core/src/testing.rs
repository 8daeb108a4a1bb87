//! Fixtures and an in-memory notification store for unit tests.

use crate::entities::notification_event::{CreateEvent, ListEvents, NotificationEvent};
use crate::entities::notification_rule::{ListRules, NotificationRule};
use crate::threshold::ThresholdSide;
use kanau::processor::Processor;
use meterbell_sdk::objects::{
    BalanceThreshold, BalanceThresholdRuleConfig, Entitlement, EntitlementResetRuleConfig,
    EntitlementType, EntitlementValue, Feature, Namespace, RuleConfig, SnapshotEvent, Subject,
    UsagePeriod, ValueOperation,
};
use std::sync::{Arc, Mutex};
use time::macros::datetime;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// A metered snapshot with fixed values, usage period June 2024.
pub fn snapshot() -> SnapshotEvent {
    SnapshotEvent {
        entitlement: Entitlement {
            id: "ent-1".to_string(),
            feature_id: "feat-1".to_string(),
            feature_key: "api-calls".to_string(),
            subject_key: "customer-1".to_string(),
            entitlement_type: EntitlementType::Metered,
            measure_usage_from: Some(datetime!(2024-01-01 00:00 UTC)),
            active_from: None,
            active_to: None,
            deleted_at: None,
        },
        namespace: Namespace {
            id: "default".to_string(),
        },
        subject: Subject {
            id: Some("subj-1".to_string()),
            key: "customer-1".to_string(),
            display_name: None,
        },
        feature: Feature {
            id: "feat-1".to_string(),
            key: "api-calls".to_string(),
            name: "API calls".to_string(),
        },
        operation: ValueOperation::Update,
        calculated_at: Some(datetime!(2024-06-15 12:00 UTC)),
        value: Some(EntitlementValue::metered(60.0, 40.0, 0.0)),
        current_usage_period: Some(UsagePeriod {
            from: datetime!(2024-06-01 00:00 UTC),
            to: datetime!(2024-07-01 00:00 UTC),
        }),
    }
}

/// A snapshot whose usage period contains the current instant.
pub fn live_snapshot(balance: f64, usage: f64) -> SnapshotEvent {
    let now = OffsetDateTime::now_utc();
    let mut event = snapshot();
    event.calculated_at = Some(now);
    event.value = Some(EntitlementValue::metered(balance, usage, 0.0));
    event.current_usage_period = Some(UsagePeriod {
        from: now - Duration::days(1),
        to: now + Duration::days(29),
    });
    event
}

pub fn balance_rule(id: &str, thresholds: Vec<BalanceThreshold>) -> NotificationRule {
    NotificationRule {
        id: id.to_string(),
        namespace: "default".to_string(),
        name: format!("{id} balance"),
        config: RuleConfig::BalanceThreshold(BalanceThresholdRuleConfig {
            thresholds,
            features: vec![],
        }),
        enabled_channels: vec!["channel-1".to_string()],
    }
}

pub fn reset_rule(id: &str) -> NotificationRule {
    NotificationRule {
        id: id.to_string(),
        namespace: "default".to_string(),
        name: format!("{id} reset"),
        config: RuleConfig::EntitlementReset(EntitlementResetRuleConfig { features: vec![] }),
        enabled_channels: vec!["channel-1".to_string()],
    }
}

#[derive(Debug, Clone)]
struct StoredEvent {
    event: NotificationEvent,
    entitlement_id: String,
    threshold_side: Option<ThresholdSide>,
    threshold: Option<BalanceThreshold>,
}

#[derive(Debug, Default)]
struct Inner {
    rules: Vec<NotificationRule>,
    events: Vec<StoredEvent>,
    deliveries: Vec<(Uuid, String)>,
    calls_before_failure: u32,
    failures_remaining: u32,
    create_calls: u32,
}

/// Rule and event store kept in memory, answering the same queries as the
/// Postgres store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn with_rules(rules: Vec<NotificationRule>) -> Self {
        let store = Self::default();
        store.inner.lock().unwrap().rules = rules;
        store
    }

    pub fn set_rules(&self, rules: Vec<NotificationRule>) {
        self.inner.lock().unwrap().rules = rules;
    }

    /// Make the next `n` storage calls fail with a pool timeout.
    pub fn fail_next(&self, n: u32) {
        self.fail_after(0, n);
    }

    /// Let `ok` storage calls through, then fail the following `n`.
    pub fn fail_after(&self, ok: u32, n: u32) {
        let mut inner = self.inner.lock().unwrap();
        inner.calls_before_failure = ok;
        inner.failures_remaining = n;
    }

    /// Store an event as-is, bypassing deduplication.
    pub fn seed_event_on_side(&self, event: NotificationEvent, side: ThresholdSide) {
        let threshold = event
            .payload
            .as_balance_threshold()
            .map(|payload| payload.threshold.canonical());
        self.inner.lock().unwrap().events.push(StoredEvent {
            entitlement_id: event.payload.base().entitlement.id.clone(),
            event,
            threshold_side: Some(side),
            threshold,
        });
    }

    pub fn clear_events(&self) {
        self.inner.lock().unwrap().events.clear();
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        let inner = self.inner.lock().unwrap();
        inner.events.iter().map(|stored| stored.event.clone()).collect()
    }

    pub fn deliveries(&self) -> Vec<(Uuid, String)> {
        self.inner.lock().unwrap().deliveries.clone()
    }

    /// Number of `CreateEvent` calls, including deduplicated ones.
    pub fn create_calls(&self) -> u32 {
        self.inner.lock().unwrap().create_calls
    }

    fn check_failure(inner: &mut Inner) -> Result<(), sqlx::Error> {
        if inner.failures_remaining == 0 {
            return Ok(());
        }
        if inner.calls_before_failure > 0 {
            inner.calls_before_failure -= 1;
            return Ok(());
        }
        inner.failures_remaining -= 1;
        Err(sqlx::Error::PoolTimedOut)
    }
}

impl Processor<ListRules> for MemoryStore {
    type Output = Vec<NotificationRule>;
    type Error = sqlx::Error;
    async fn process(&self, query: ListRules) -> Result<Vec<NotificationRule>, sqlx::Error> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_failure(&mut inner)?;
        Ok(inner
            .rules
            .iter()
            .filter(|rule| {
                rule.namespace == query.namespace && rule.config.event_type() == query.event_type
            })
            .cloned()
            .collect())
    }
}

impl Processor<ListEvents> for MemoryStore {
    type Output = Vec<NotificationEvent>;
    type Error = sqlx::Error;
    async fn process(&self, query: ListEvents) -> Result<Vec<NotificationEvent>, sqlx::Error> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_failure(&mut inner)?;

        let mut matched: Vec<&StoredEvent> = inner
            .events
            .iter()
            .rev()
            .filter(|stored| stored.event.namespace == query.namespace)
            .filter(|stored| {
                query.period.is_none_or(|period| {
                    stored.event.created_at >= period.from && stored.event.created_at <= period.to
                })
            })
            .filter(|stored| {
                query.dedup_hashes.is_empty()
                    || stored
                        .event
                        .dedup_hash
                        .as_ref()
                        .is_some_and(|hash| query.dedup_hashes.contains(hash))
            })
            .filter(|stored| {
                query.rule_ids.is_empty() || query.rule_ids.contains(&stored.event.rule_id)
            })
            .filter(|stored| {
                query.entitlement_ids.is_empty()
                    || query.entitlement_ids.contains(&stored.entitlement_id)
            })
            .filter(|stored| {
                query
                    .event_type
                    .is_none_or(|event_type| stored.event.event_type == event_type)
            })
            .filter(|stored| {
                query
                    .threshold_side
                    .is_none_or(|side| stored.threshold_side == Some(side))
            })
            .collect();
        matched.sort_by(|a, b| b.event.created_at.cmp(&a.event.created_at));
        if let Some(limit) = query.limit {
            matched.truncate(limit as usize);
        }
        Ok(matched.into_iter().map(|stored| stored.event.clone()).collect())
    }
}

impl Processor<CreateEvent> for MemoryStore {
    type Output = Option<NotificationEvent>;
    type Error = sqlx::Error;
    async fn process(&self, cmd: CreateEvent) -> Result<Option<NotificationEvent>, sqlx::Error> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_failure(&mut inner)?;
        inner.create_calls += 1;

        let threshold = cmd
            .payload
            .as_balance_threshold()
            .map(|payload| payload.threshold.canonical());
        if cmd.dedup_hash.is_some() {
            let duplicate = inner.events.iter().any(|stored| {
                stored.event.namespace == cmd.namespace
                    && stored.event.dedup_hash == cmd.dedup_hash
                    && stored.threshold == threshold
            });
            if duplicate {
                return Ok(None);
            }
        }

        let event = NotificationEvent {
            id: Uuid::now_v7(),
            namespace: cmd.namespace,
            rule_id: cmd.rule_id,
            event_type: cmd.payload.event_type(),
            annotations: cmd.annotations,
            dedup_hash: cmd.dedup_hash,
            created_at: OffsetDateTime::now_utc(),
            payload: cmd.payload,
        };
        for channel in cmd.channels {
            inner.deliveries.push((event.id, channel));
        }
        inner.events.push(StoredEvent {
            entitlement_id: event.payload.base().entitlement.id.clone(),
            event: event.clone(),
            threshold_side: cmd.threshold_side,
            threshold,
        });
        Ok(Some(event))
    }
}
