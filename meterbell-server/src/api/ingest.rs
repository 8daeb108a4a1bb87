//! Snapshot ingest API.
//!
//! Called by the entitlement subsystem whenever it produces a snapshot.
//! Requests carry a signed body verified via the `Meterbell-Signature` header.
//!
//! # Endpoints
//!
//! - `POST /snapshots` – queue an entitlement snapshot for evaluation

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use meterbell_core::events::SnapshotEnvelope;
use meterbell_sdk::objects::{SnapshotAccepted, SnapshotEvent};

use crate::api::extractors::SignedBody;
use crate::state::AppState;

/// Build the ingest API router.
pub fn router() -> Router<AppState> {
    Router::new().route("/snapshots", post(ingest_snapshot))
}

/// `POST /snapshots`: queue a snapshot.
///
/// Evaluation happens asynchronously; the response only confirms that the
/// snapshot was queued.
async fn ingest_snapshot(
    State(state): State<AppState>,
    SignedBody(snapshot): SignedBody<SnapshotEvent>,
) -> Result<impl IntoResponse, IngestApiError> {
    let accepted = SnapshotAccepted {
        namespace: snapshot.namespace.id.clone(),
        entitlement_id: snapshot.entitlement.id.clone(),
    };

    state
        .snapshot_tx
        .send(SnapshotEnvelope::new(snapshot))
        .await
        .map_err(|_| IngestApiError::QueueClosed)?;

    tracing::debug!(
        namespace = %accepted.namespace,
        entitlement_id = %accepted.entitlement_id,
        "Snapshot queued"
    );
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// Errors that can occur in ingest API handlers.
#[derive(Debug)]
enum IngestApiError {
    /// The consumer is gone, typically during shutdown.
    QueueClosed,
}

impl IntoResponse for IngestApiError {
    fn into_response(self) -> Response {
        match self {
            IngestApiError::QueueClosed => {
                tracing::warn!("Snapshot queue closed, rejecting snapshot");
                (StatusCode::SERVICE_UNAVAILABLE, "snapshot queue unavailable").into_response()
            }
        }
    }
}
