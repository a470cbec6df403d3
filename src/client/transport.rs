use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;

use crate::ingest::{BatchResponse, PingPayload};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server responded with {status}: {body}")]
    Status { status: u16, body: String },
}

/// Delivers a batch of pings to the ingestion endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, pings: &[PingPayload]) -> Result<BatchResponse, TransportError>;
}

/// Posts batches to `POST /api/ingest` with a bearer token.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn deliver(&self, pings: &[PingPayload]) -> Result<BatchResponse, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&json!({ "pings": pings }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<BatchResponse>().await?)
    }
}
