//! Application state shared across all request handlers.

use crate::config::runtime::IngestConfig;
use meterbell_core::events::SnapshotSender;
use std::sync::Arc;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around.
#[derive(Clone)]
pub struct AppState {
    /// Queue feeding the snapshot consumer.
    pub snapshot_tx: SnapshotSender,
    /// Ingest signing settings.
    pub ingest: Arc<IngestConfig>,
}

impl AppState {
    pub fn new(snapshot_tx: SnapshotSender, ingest: IngestConfig) -> Self {
        Self {
            snapshot_tx,
            ingest: Arc::new(ingest),
        }
    }
}
