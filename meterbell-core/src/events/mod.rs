//! Event system for the evaluation pipeline.
//!
//! # Event Flow
//!
//! 1. The ingest API (or any other producer) sends a `SnapshotEnvelope`
//! 2. `SnapshotConsumer` receives it and runs every handler on the snapshot
//! 3. Handlers append `NotificationEvent`s to the event store
//! 4. Retryable failures put the envelope back on the channel after a delay
//!
//! Snapshots carry the full entitlement state, so handlers never re-fetch
//! the entitlement.

pub mod channels;
pub mod types;

pub use channels::{DEFAULT_CHANNEL_BUFFER, SnapshotReceiver, SnapshotSender, snapshot_channel};
pub use types::SnapshotEnvelope;
