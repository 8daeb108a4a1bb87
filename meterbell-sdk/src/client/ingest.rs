use reqwest::Client;
use url::Url;

use super::ClientError;
use crate::objects::{SnapshotAccepted, SnapshotEvent};
use crate::signature::{SIGNATURE_HEADER, SignedObject};

/// Typed HTTP client for the snapshot ingest API.
///
/// Every request body is signed with
/// `HMAC-SHA256("{timestamp}.{json}", ingest_secret)`.
#[derive(Debug, Clone)]
pub struct IngestClient {
    http: Client,
    base_url: Url,
    secret: Vec<u8>,
}

impl IngestClient {
    pub fn new(base_url: Url, ingest_secret: impl Into<Vec<u8>>) -> Self {
        Self {
            http: Client::new(),
            base_url,
            secret: ingest_secret.into(),
        }
    }

    /// Replace the default `reqwest::Client`, e.g. to set timeouts.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// `POST /api/v1/snapshots` – hand a snapshot to the evaluator.
    pub async fn send_snapshot(
        &self,
        snapshot: SnapshotEvent,
    ) -> Result<SnapshotAccepted, ClientError> {
        let signed = SignedObject::new(snapshot, &self.secret)?;
        let url = self.base_url.join("/api/v1/snapshots")?;

        let resp = self
            .http
            .post(url)
            .header(SIGNATURE_HEADER, signed.to_header())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(signed.json)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Api { status, body });
        }
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
