//! SnapshotConsumer processor.
//!
//! The SnapshotConsumer is responsible for:
//! - Receiving `SnapshotEnvelope` from the queue
//! - Running the balance threshold and entitlement reset handlers on it
//! - Redelivering the snapshot with exponential backoff (2^0 to 2^11 seconds)
//!   when a handler failed on storage, up to a retry limit
//!
//! Both handlers are idempotent within a usage period, so a redelivered
//! snapshot never notifies twice for the same threshold.

use crate::entities::notification_event::NotificationEvent;
use crate::events::{SnapshotEnvelope, SnapshotReceiver, SnapshotSender};
use crate::processors::error::HandlerError;
use crate::processors::{BalanceThresholdHandler, EntitlementResetHandler, NotificationStore};
use itertools::Itertools;
use kanau::processor::Processor;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Maximum backoff exponent (2^11 = 2048 seconds max backoff)
const MAX_BACKOFF_EXPONENT: u32 = 11;

/// Every handler failure of one snapshot delivery.
#[derive(Debug, Error)]
#[error("{}", .0.iter().join("; "))]
pub struct DispatchError(pub Vec<HandlerError>);

impl DispatchError {
    pub fn is_retryable(&self) -> bool {
        self.0.iter().any(HandlerError::is_retryable)
    }
}

/// SnapshotConsumer feeds queued snapshots to the handlers.
pub struct SnapshotConsumer<S> {
    balance_threshold: BalanceThresholdHandler<S>,
    entitlement_reset: EntitlementResetHandler<S>,
    retry_tx: mpsc::WeakSender<SnapshotEnvelope>,
    max_retries: u32,
}

impl<S: NotificationStore> SnapshotConsumer<S> {
    /// Create a new SnapshotConsumer.
    ///
    /// # Arguments
    ///
    /// * `store` - Rule and event store
    /// * `snapshot_tx` - Sender of the consumer's own queue, used for redelivery
    /// * `max_retries` - Redeliveries allowed per snapshot
    pub fn new(store: S, snapshot_tx: &SnapshotSender, max_retries: u32) -> Self {
        Self {
            balance_threshold: BalanceThresholdHandler::new(store.clone()),
            entitlement_reset: EntitlementResetHandler::new(store),
            retry_tx: snapshot_tx.downgrade(),
            max_retries,
        }
    }

    /// Run the SnapshotConsumer until shutdown or until every sender is gone.
    pub async fn run(
        self,
        mut snapshot_rx: SnapshotReceiver,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        info!("SnapshotConsumer started");

        loop {
            tokio::select! {
                biased;

                // Check for shutdown
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("SnapshotConsumer received shutdown signal");
                        break;
                    }
                }

                // Receive snapshots
                Some(envelope) = snapshot_rx.recv() => {
                    debug!(
                        namespace = %envelope.event.namespace.id,
                        entitlement_id = %envelope.event.entitlement.id,
                        attempt = envelope.attempt,
                        "Received snapshot"
                    );
                    self.handle(envelope, &shutdown_rx).await;
                }

                else => {
                    info!("Snapshot channel closed");
                    break;
                }
            }
        }

        info!("SnapshotConsumer shutdown complete");
    }

    async fn handle(&self, envelope: SnapshotEnvelope, shutdown_rx: &watch::Receiver<bool>) {
        let err = match self.dispatch(&envelope).await {
            Ok(events) => {
                if !events.is_empty() {
                    info!(
                        entitlement_id = %envelope.event.entitlement.id,
                        count = events.len(),
                        "Snapshot produced notifications"
                    );
                }
                return;
            }
            Err(err) => err,
        };

        if !err.is_retryable() {
            error!(
                entitlement_id = %envelope.event.entitlement.id,
                error = %err,
                "Snapshot evaluation failed"
            );
            return;
        }
        if envelope.attempt >= self.max_retries {
            error!(
                entitlement_id = %envelope.event.entitlement.id,
                attempt = envelope.attempt,
                error = %err,
                "Snapshot evaluation failed, giving up"
            );
            return;
        }

        let Some(retry_tx) = self.retry_tx.upgrade() else {
            warn!("Snapshot channel closed, dropping retry");
            return;
        };
        let delay = calculate_retry_delay(envelope.attempt);
        warn!(
            entitlement_id = %envelope.event.entitlement.id,
            attempt = envelope.attempt,
            delay_secs = delay.as_secs(),
            error = %err,
            "Snapshot evaluation failed, scheduling retry"
        );

        let mut shutdown_rx = shutdown_rx.clone();
        let envelope = envelope.retry();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    debug!("Retry dropped on shutdown");
                }
                _ = tokio::time::sleep(delay) => {
                    if retry_tx.send(envelope).await.is_err() {
                        warn!("Snapshot channel closed, dropping retry");
                    }
                }
            }
        });
    }

    /// Run every handler on one snapshot.
    async fn dispatch(
        &self,
        envelope: &SnapshotEnvelope,
    ) -> Result<Vec<NotificationEvent>, DispatchError> {
        let mut emitted = Vec::new();
        let mut errors = Vec::new();

        match self.balance_threshold.process(envelope.event.clone()).await {
            Ok(events) => emitted.extend(events),
            Err(e) => errors.push(e),
        }
        match self.entitlement_reset.process(envelope.event.clone()).await {
            Ok(events) => emitted.extend(events),
            Err(e) => errors.push(e),
        }

        if errors.is_empty() {
            Ok(emitted)
        } else {
            Err(DispatchError(errors))
        }
    }
}

/// Calculate the next retry delay based on retry count.
///
/// Uses exponential backoff: 2^retry_count seconds.
pub fn calculate_retry_delay(retry_count: u32) -> std::time::Duration {
    let seconds = 2u64.pow(retry_count.min(MAX_BACKOFF_EXPONENT));
    std::time::Duration::from_secs(seconds)
}
