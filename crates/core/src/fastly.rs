//! Fastly API client for purging cached build content

use crate::error::{Error, Result};
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::{error, info};

const FASTLY_API_ROOT: &str = "https://api.fastly.com";

/// Body Fastly returns for a successful purge. Only the HTTP status decides
/// success, so missing fields stay empty.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PurgeResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub id: Option<String>,
}

/// Fastly API client scoped to one service
pub struct FastlyClient {
    http_client: Client,
    service_id: String,
    api_key: String,
    base_url: String,
}

impl FastlyClient {
    /// Create a new Fastly client
    pub fn new(http_client: Client, service_id: &str, api_key: &str) -> Self {
        Self {
            http_client,
            service_id: service_id.to_string(),
            api_key: api_key.to_string(),
            base_url: FASTLY_API_ROOT.to_string(),
        }
    }

    /// Point the client at another API root
    pub fn with_api_root(mut self, api_root: &str) -> Self {
        self.base_url = api_root.trim_end_matches('/').to_string();
        self
    }

    /// Purge everything tagged with `surrogate_key`
    pub async fn purge_key(&self, surrogate_key: &str) -> Result<PurgeResponse> {
        let url = format!(
            "{}/service/{}/purge/{}",
            self.base_url, self.service_id, surrogate_key
        );
        let response = self
            .http_client
            .post(&url)
            .header("Fastly-Key", &self.api_key)
            .header("Accept", "application/json")
            .send()
            .await?;

        let purge = self.handle_response(response).await?;
        info!(surrogate_key = %surrogate_key, id = ?purge.id, "Purged Fastly surrogate key");
        Ok(purge)
    }

    async fn handle_response(&self, response: Response) -> Result<PurgeResponse> {
        let status = response.status();
        if status.as_u16() == 200 {
            let body = response.text().await?;
            Ok(serde_json::from_str(&body).unwrap_or_default())
        } else {
            let error_text = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), service = %self.service_id, "Fastly purge failed");
            Err(Error::Fastly(format!(
                "HTTP {}: {}",
                status.as_u16(),
                error_text
            )))
        }
    }
}
