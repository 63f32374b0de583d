use super::{PollQuery, PollingClient, TransportError};
use crate::protocol::{Batch, PollResponse};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Path of the polling fallback endpoint
pub const POLLING_PATH: &str = "/api/vessels/polling";

/// HTTP client for the polling fallback endpoint.
pub struct HttpPollingClient {
    http_client: Client,
    base_url: String,
}

impl HttpPollingClient {
    /// Create a client for `base_url` (e.g., "http://localhost:3000").
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent("livefeed/0.1")
            .timeout(request_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Full URL for `query`
    pub fn url_for(&self, query: &PollQuery) -> Result<String, TransportError> {
        let qs = serde_urlencoded::to_string(query)
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(format!("{}{}?{}", self.base_url, POLLING_PATH, qs))
    }
}

#[async_trait]
impl PollingClient for HttpPollingClient {
    async fn fetch(&self, query: &PollQuery) -> Result<Batch, TransportError> {
        let url = self.url_for(query)?;
        debug!(url = %url, "Polling vessels");

        let response = self
            .http_client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let parsed: PollResponse =
            serde_json::from_str(&body).map_err(|e| TransportError::Decode(e.to_string()))?;

        Ok(Batch::from(parsed))
    }
}
