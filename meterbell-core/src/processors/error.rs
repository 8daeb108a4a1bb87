use crate::threshold::ThresholdError;
use itertools::Itertools;
use meterbell_sdk::objects::EventType;
use thiserror::Error;

/// Why a single rule could not be evaluated.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Threshold(#[from] ThresholdError),

    #[error("failed to build dedup key: {0}")]
    DedupKey(#[from] time::error::Format),
}

/// A failed rule, with enough context to find it again.
#[derive(Debug, Error)]
#[error("rule {rule_id} on entitlement {entitlement_id}: {source}")]
pub struct RuleError {
    pub rule_id: String,
    pub entitlement_id: String,
    #[source]
    pub source: EvaluationError,
}

/// Errors returned by a snapshot handler.
///
/// A failing rule never stops the others; their errors are collected.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("failed to list {event_type} rules: {source}")]
    ListRules {
        event_type: EventType,
        #[source]
        source: sqlx::Error,
    },

    #[error("{}", .0.iter().join("; "))]
    Rules(Vec<RuleError>),
}

impl HandlerError {
    /// Whether delivering the same snapshot again could succeed.
    ///
    /// Only storage failures are transient; a misconfigured rule fails the
    /// same way every time.
    pub fn is_retryable(&self) -> bool {
        match self {
            HandlerError::ListRules { .. } => true,
            HandlerError::Rules(errors) => errors
                .iter()
                .any(|e| matches!(e.source, EvaluationError::Database(_))),
        }
    }

    pub fn rule_errors(&self) -> &[RuleError] {
        match self {
            HandlerError::ListRules { .. } => &[],
            HandlerError::Rules(errors) => errors,
        }
    }
}
