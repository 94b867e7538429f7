//! Ledger validation client
//!
//! POSTs `{"id_participante": "<id>"}` to the validation endpoint. Any HTTP response,
//! including 4xx/5xx, is a reply; only transport failures are `NetworkError`.

use crate::domain::error::NetworkError;
use crate::domain::participant::{BackendReply, ValidationRequest};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

/// Ledger capability: exactly one request per call
#[async_trait]
pub trait ValidationClient: Send + Sync {
    async fn validate(&self, participant_id: &str) -> Result<BackendReply, NetworkError>;
}

pub struct HttpValidationClient {
    url: String,
    client: reqwest::Client,
}

impl HttpValidationClient {
    /// No request timeout: a hung request keeps the scanner paused until the
    /// transport gives up
    pub fn new(url: &str) -> Result<Self, NetworkError> {
        let client = reqwest::Client::builder()
            .http1_only()
            .build()
            .map_err(|e| NetworkError::new(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { url: url.to_string(), client })
    }
}

#[async_trait]
impl ValidationClient for HttpValidationClient {
    async fn validate(&self, participant_id: &str) -> Result<BackendReply, NetworkError> {
        let body = serde_json::to_vec(&ValidationRequest { participant_id: participant_id.to_string() })
            .map_err(|e| NetworkError::new(format!("failed to encode request: {e}")))?;

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| NetworkError::new(e.to_string()))?;

        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(|e| NetworkError::new(e.to_string()))?;
        debug!(status = %status, body_len = %bytes.len(), "ledger_response_received");

        Ok(BackendReply::from_parts(status, &bytes))
    }
}
