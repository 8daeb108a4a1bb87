//! Event types flowing through the evaluation pipeline.

use meterbell_sdk::objects::SnapshotEvent;

/// A snapshot waiting to be evaluated.
///
/// `attempt` counts deliveries of this snapshot to the consumer: the first
/// delivery is attempt 0, and every retry after a retryable failure adds one.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEnvelope {
    pub event: SnapshotEvent,
    pub attempt: u32,
}

impl SnapshotEnvelope {
    pub fn new(event: SnapshotEvent) -> Self {
        Self { event, attempt: 0 }
    }

    /// The same snapshot, scheduled for its next attempt.
    pub fn retry(self) -> Self {
        Self {
            event: self.event,
            attempt: self.attempt + 1,
        }
    }
}

impl From<SnapshotEvent> for SnapshotEnvelope {
    fn from(event: SnapshotEvent) -> Self {
        Self::new(event)
    }
}
