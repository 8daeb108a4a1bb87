//! Deduplication keys for balance threshold notifications.
//!
//! The key identifies "this rule, this entitlement, this usage period". Every
//! evaluation of the same entitlement within one period produces the same
//! key, which is how the evaluator finds the last notification it recorded.
//!
//! The source string is
//!
//! ```text
//! {rule_id}/{namespace}/{period_from}/{period_to}/{subject_key}/{entitlement_id}/{feature_id}/{measure_usage_from}
//! ```
//!
//! with timestamps in RFC3339 UTC at second precision, hashed with SHA-256
//! and hex-encoded behind a version prefix. Keys are already stored in event
//! tables, so the format must not change without bumping the prefix.

use meterbell_sdk::objects::SnapshotEvent;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

/// Version prefix of balance snapshot keys.
pub const BALANCE_DEDUP_VERSION: &str = "bsnap_v1";

/// Rendering of an absent timestamp: the zero instant, year 1.
const ZERO_TIME: &str = "0001-01-01T00:00:00Z";

/// Build the deduplication key of a balance threshold notification.
///
/// A snapshot without a current usage period hashes as if the period were
/// zero-to-zero. Fails when a timestamp has no RFC3339 rendering, such as a
/// negative year.
pub fn balance_event_dedup_hash(
    snapshot: &SnapshotEvent,
    rule_id: &str,
) -> Result<String, time::error::Format> {
    let (period_from, period_to) = match snapshot.current_usage_period {
        Some(period) => (format_timestamp(period.from)?, format_timestamp(period.to)?),
        None => (ZERO_TIME.to_string(), ZERO_TIME.to_string()),
    };
    let measure_usage_from = match snapshot.entitlement.measure_usage_from {
        Some(ts) => format_timestamp(ts)?,
        None => ZERO_TIME.to_string(),
    };

    let source = [
        rule_id,
        snapshot.namespace.id.as_str(),
        period_from.as_str(),
        period_to.as_str(),
        snapshot.subject.key.as_str(),
        snapshot.entitlement.id.as_str(),
        snapshot.feature.id.as_str(),
        measure_usage_from.as_str(),
    ]
    .join("/");

    let digest = ring::digest::digest(&ring::digest::SHA256, source.as_bytes());
    Ok(format!("{BALANCE_DEDUP_VERSION}_{}", hex::encode(digest.as_ref())))
}

/// RFC3339 in UTC, truncated to whole seconds.
fn format_timestamp(ts: OffsetDateTime) -> Result<String, time::error::Format> {
    ts.to_offset(UtcOffset::UTC)
        .replace_nanosecond(0)
        .map_err(|_| time::error::Format::InvalidComponent("nanosecond"))?
        .format(&Rfc3339)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::snapshot;
    use time::macros::{datetime, offset};
    use time::{Date, Month};

    #[test]
    fn test_known_key() {
        let event = snapshot();
        assert_eq!(
            balance_event_dedup_hash(&event, "rule-1").unwrap(),
            "bsnap_v1_1d81201bb92d54eb0f9ea12133496133c57c78737c22fa2198742a04c406af1a"
        );
    }

    #[test]
    fn test_missing_period_and_measure_start_use_zero_time() {
        let mut event = snapshot();
        event.current_usage_period = None;
        event.entitlement.measure_usage_from = None;
        assert_eq!(
            balance_event_dedup_hash(&event, "rule-1").unwrap(),
            "bsnap_v1_02e89f9c68a3a3ec2d1d469f29cfffad639bd960da749d77b27dd51310dbcf58"
        );
    }

    #[test]
    fn test_key_ignores_offset_and_subsecond_precision() {
        let mut event = snapshot();
        let base = balance_event_dedup_hash(&event, "rule-1").unwrap();

        if let Some(period) = event.current_usage_period.as_mut() {
            period.from = datetime!(2024-06-01 02:00:00.75 +02:00);
        }
        event.entitlement.measure_usage_from =
            Some(datetime!(2024-01-01 00:00:00.5 UTC).to_offset(offset!(-05:00)));

        assert_eq!(balance_event_dedup_hash(&event, "rule-1").unwrap(), base);
    }

    #[test]
    fn test_every_field_changes_the_key() {
        let base_event = snapshot();
        let base = balance_event_dedup_hash(&base_event, "rule-1").unwrap();
        assert!(base.starts_with("bsnap_v1_"));
        assert_eq!(base.len(), "bsnap_v1_".len() + 64);

        assert_ne!(balance_event_dedup_hash(&base_event, "rule-2").unwrap(), base);

        let variants: Vec<Box<dyn Fn(&mut SnapshotEvent)>> = vec![
            Box::new(|e| e.namespace.id = "other".to_string()),
            Box::new(|e| {
                if let Some(p) = e.current_usage_period.as_mut() {
                    p.from = datetime!(2024-05-01 00:00 UTC);
                }
            }),
            Box::new(|e| {
                if let Some(p) = e.current_usage_period.as_mut() {
                    p.to = datetime!(2024-08-01 00:00 UTC);
                }
            }),
            Box::new(|e| e.subject.key = "customer-2".to_string()),
            Box::new(|e| e.entitlement.id = "ent-2".to_string()),
            Box::new(|e| e.feature.id = "feat-2".to_string()),
            Box::new(|e| {
                e.entitlement.measure_usage_from = Some(datetime!(2024-02-01 00:00 UTC))
            }),
        ];

        for change in variants {
            let mut event = base_event.clone();
            change(&mut event);
            assert_ne!(balance_event_dedup_hash(&event, "rule-1").unwrap(), base);
        }
    }

    #[test]
    fn test_value_does_not_affect_key() {
        let mut event = snapshot();
        let base = balance_event_dedup_hash(&event, "rule-1").unwrap();
        if let Some(value) = event.value.as_mut() {
            value.usage = Some(99.0);
        }
        assert_eq!(balance_event_dedup_hash(&event, "rule-1").unwrap(), base);
    }

    #[test]
    fn test_zero_time_is_the_rfc3339_of_year_one() {
        let zero = Date::from_calendar_date(1, Month::January, 1).unwrap();
        let zero = zero.midnight().assume_utc();
        assert_eq!(format_timestamp(zero).unwrap(), ZERO_TIME);
    }

    #[test]
    fn test_timestamp_outside_rfc3339_is_rejected() {
        let mut event = snapshot();
        let before_year_zero = Date::from_calendar_date(-1, Month::January, 1).unwrap();
        event.entitlement.measure_usage_from = Some(before_year_zero.midnight().assume_utc());
        assert!(matches!(
            balance_event_dedup_hash(&event, "rule-1"),
            Err(time::error::Format::InvalidComponent("year"))
        ));
    }
}
