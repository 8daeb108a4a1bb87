use crate::entities::NotificationEventType;
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use meterbell_sdk::objects::{BalanceThresholdRuleConfig, EventType, RuleConfig};
use sqlx::types::Json;

/// A notification rule as the evaluator sees it: read-only, already
/// filtered to enabled rules, with the ids of its enabled channels.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRule {
    pub id: String,
    pub namespace: String,
    pub name: String,
    pub config: RuleConfig,
    pub enabled_channels: Vec<String>,
}

impl NotificationRule {
    pub fn has_enabled_channels(&self) -> bool {
        !self.enabled_channels.is_empty()
    }

    pub fn balance_threshold_config(&self) -> Option<&BalanceThresholdRuleConfig> {
        match &self.config {
            RuleConfig::BalanceThreshold(config) => Some(config),
            RuleConfig::EntitlementReset(_) => None,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct NotificationRuleRow {
    id: String,
    namespace: String,
    name: String,
    config: Json<RuleConfig>,
    enabled_channels: Vec<String>,
}

impl From<NotificationRuleRow> for NotificationRule {
    fn from(row: NotificationRuleRow) -> Self {
        Self {
            id: row.id,
            namespace: row.namespace,
            name: row.name,
            config: row.config.0,
            enabled_channels: row.enabled_channels,
        }
    }
}

#[derive(Debug, Clone)]
/// List the enabled, non-deleted rules of one type in a namespace.
pub struct ListRules {
    pub namespace: String,
    pub event_type: EventType,
}

impl Processor<ListRules> for DatabaseProcessor {
    type Output = Vec<NotificationRule>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListRules")]
    async fn process(&self, query: ListRules) -> Result<Vec<NotificationRule>, sqlx::Error> {
        let rows = sqlx::query_as::<_, NotificationRuleRow>(
            r#"
            SELECT
                r.id,
                r.namespace,
                r.name,
                r.config,
                ARRAY(
                    SELECT c.id
                    FROM notification_rule_channels rc
                    JOIN notification_channels c ON c.id = rc.channel_id
                    WHERE rc.rule_id = r.id
                      AND c.disabled = false
                      AND c.deleted_at IS NULL
                    ORDER BY c.id
                ) AS enabled_channels
            FROM notification_rules r
            WHERE r.namespace = $1
              AND r.event_type = $2
              AND r.disabled = false
              AND r.deleted_at IS NULL
            ORDER BY r.created_at ASC
            "#,
        )
        .bind(&query.namespace)
        .bind(NotificationEventType::from(query.event_type))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(NotificationRule::from).collect())
    }
}
