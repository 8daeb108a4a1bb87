pub mod notification_event;
pub mod notification_rule;

use meterbell_sdk::objects::EventType as SdkEventType;

/// Notification event type for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `meterbell_sdk::objects::EventType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "notification_event_type")]
pub enum NotificationEventType {
    #[sqlx(rename = "entitlements.balance.threshold")]
    BalanceThreshold,
    #[sqlx(rename = "entitlements.reset")]
    EntitlementReset,
}

impl From<NotificationEventType> for SdkEventType {
    fn from(value: NotificationEventType) -> Self {
        match value {
            NotificationEventType::BalanceThreshold => SdkEventType::BalanceThreshold,
            NotificationEventType::EntitlementReset => SdkEventType::EntitlementReset,
        }
    }
}

impl From<SdkEventType> for NotificationEventType {
    fn from(value: SdkEventType) -> Self {
        match value {
            SdkEventType::BalanceThreshold => NotificationEventType::BalanceThreshold,
            SdkEventType::EntitlementReset => NotificationEventType::EntitlementReset,
        }
    }
}
