use crate::entities::NotificationEventType;
use crate::framework::DatabaseProcessor;
use crate::threshold::ThresholdSide;
use kanau::processor::Processor;
use meterbell_sdk::objects::{Annotations, EventPayload, EventType, UsagePeriod};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

/// A notification recorded for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEvent {
    pub id: Uuid,
    pub namespace: String,
    pub rule_id: String,
    pub event_type: EventType,
    pub payload: EventPayload,
    pub annotations: Annotations,
    /// Absent for event types that are not deduplicated by key.
    pub dedup_hash: Option<String>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
struct NotificationEventRow {
    id: Uuid,
    namespace: String,
    rule_id: String,
    event_type: NotificationEventType,
    payload: Json<EventPayload>,
    annotations: Json<Annotations>,
    dedup_hash: Option<String>,
    created_at: OffsetDateTime,
}

impl From<NotificationEventRow> for NotificationEvent {
    fn from(row: NotificationEventRow) -> Self {
        Self {
            id: row.id,
            namespace: row.namespace,
            rule_id: row.rule_id,
            event_type: row.event_type.into(),
            payload: row.payload.0,
            annotations: row.annotations.0,
            dedup_hash: row.dedup_hash,
            created_at: row.created_at,
        }
    }
}

const EVENT_COLUMNS: &str =
    "id, namespace, rule_id, event_type, payload, annotations, dedup_hash, created_at";

#[derive(Debug, Clone, Default)]
/// List events of a namespace, newest first.
///
/// Every filter left empty is not applied.
pub struct ListEvents {
    pub namespace: String,
    /// Only events created within `from..=to`.
    pub period: Option<UsagePeriod>,
    pub dedup_hashes: Vec<String>,
    pub rule_ids: Vec<String>,
    pub entitlement_ids: Vec<String>,
    pub event_type: Option<EventType>,
    pub threshold_side: Option<ThresholdSide>,
    pub limit: Option<u32>,
}

impl ListEvents {
    /// The SELECT for this query's filters, in bind order.
    fn query_builder(self) -> QueryBuilder<'static, Postgres> {
        let ListEvents {
            namespace,
            period,
            dedup_hashes,
            rule_ids,
            entitlement_ids,
            event_type,
            threshold_side,
            limit,
        } = self;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("SELECT ");
        builder
            .push(EVENT_COLUMNS)
            .push(" FROM notification_events WHERE namespace = ")
            .push_bind(namespace);
        if let Some(period) = period {
            builder
                .push(" AND created_at >= ")
                .push_bind(period.from)
                .push(" AND created_at <= ")
                .push_bind(period.to);
        }
        if !dedup_hashes.is_empty() {
            builder
                .push(" AND dedup_hash = ANY(")
                .push_bind(dedup_hashes)
                .push(")");
        }
        if !rule_ids.is_empty() {
            builder
                .push(" AND rule_id = ANY(")
                .push_bind(rule_ids)
                .push(")");
        }
        if !entitlement_ids.is_empty() {
            builder
                .push(" AND entitlement_id = ANY(")
                .push_bind(entitlement_ids)
                .push(")");
        }
        if let Some(event_type) = event_type {
            builder
                .push(" AND event_type = ")
                .push_bind(NotificationEventType::from(event_type));
        }
        if let Some(side) = threshold_side {
            builder.push(" AND threshold_side = ").push_bind(side);
        }
        builder.push(" ORDER BY created_at DESC, id DESC");
        if let Some(limit) = limit {
            builder.push(" LIMIT ").push_bind(i64::from(limit));
        }
        builder
    }
}

impl Processor<ListEvents> for DatabaseProcessor {
    type Output = Vec<NotificationEvent>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListEvents")]
    async fn process(&self, query: ListEvents) -> Result<Vec<NotificationEvent>, sqlx::Error> {
        let rows = query
            .query_builder()
            .build_query_as::<NotificationEventRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(NotificationEvent::from).collect())
    }
}

#[derive(Debug, Clone)]
/// Record a notification event and queue it on the given channels.
///
/// Returns `None` when an event with the same namespace, dedup hash and
/// threshold already exists.
pub struct CreateEvent {
    pub namespace: String,
    pub rule_id: String,
    pub payload: EventPayload,
    pub annotations: Annotations,
    pub dedup_hash: Option<String>,
    pub threshold_side: Option<ThresholdSide>,
    pub channels: Vec<String>,
}

impl Processor<CreateEvent> for DatabaseProcessor {
    type Output = Option<NotificationEvent>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:CreateEvent")]
    async fn process(&self, cmd: CreateEvent) -> Result<Option<NotificationEvent>, sqlx::Error> {
        let id = Uuid::now_v7();
        let event_type = NotificationEventType::from(cmd.payload.event_type());
        let entitlement_id = cmd.payload.base().entitlement.id.clone();
        let (threshold_kind, threshold_value) = match cmd.payload.as_balance_threshold() {
            Some(payload) => {
                let threshold = payload.threshold.canonical();
                (Some(threshold.kind.as_str().to_string()), Some(threshold.value))
            }
            None => (None, None),
        };

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, NotificationEventRow>(&format!(
            r#"
            INSERT INTO notification_events (
                id, namespace, rule_id, event_type, payload, annotations, dedup_hash,
                entitlement_id, threshold_side, threshold_kind, threshold_value
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT DO NOTHING
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&cmd.namespace)
        .bind(&cmd.rule_id)
        .bind(event_type)
        .bind(Json(&cmd.payload))
        .bind(Json(&cmd.annotations))
        .bind(&cmd.dedup_hash)
        .bind(&entitlement_id)
        .bind(cmd.threshold_side)
        .bind(threshold_kind)
        .bind(threshold_value)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = inserted else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query(
            r#"
            INSERT INTO notification_event_delivery_status (event_id, channel_id, state)
            SELECT $1, channel_id, 'pending'
            FROM UNNEST($2::text[]) AS channel_id
            "#,
        )
        .bind(row.id)
        .bind(&cmd.channels)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(row.into()))
    }
}
