//! Snapshot channel factory and handles.

use super::types::SnapshotEnvelope;
use tokio::sync::mpsc;

/// Default buffer size for the snapshot channel.
///
/// This provides enough buffer to handle bursts while keeping memory bounded.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Sender handle for snapshots.
pub type SnapshotSender = mpsc::Sender<SnapshotEnvelope>;
/// Receiver handle for snapshots.
pub type SnapshotReceiver = mpsc::Receiver<SnapshotEnvelope>;

/// Create a new snapshot channel.
///
/// Multiple senders can be cloned from the returned sender: the ingest API
/// holds one and the consumer keeps another to schedule retries.
pub fn snapshot_channel(buffer: usize) -> (SnapshotSender, SnapshotReceiver) {
    mpsc::channel(buffer.max(1))
}
