use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::error::CompletionError;
use super::types::{CompletionRequest, CompletionResponse};
use super::CompletionBackend;

const API_URL: &str = "https://api.anthropic.com/v1/messages";

/// HTTP client for the completion service.
pub struct CompletionClient {
    api_key: String,
    client: Client,
    base_url: String,
}

impl CompletionClient {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, API_URL.to_string())
    }

    /// Create a client pointing at a custom base URL (useful for testing).
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()
            .expect("failed to build HTTP client");
        Self {
            api_key,
            client,
            base_url,
        }
    }
}

#[async_trait]
impl CompletionBackend for CompletionClient {
    async fn complete(
        &self,
        req: &CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError> {
        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(req)
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(1000);
            return Err(CompletionError::RateLimited {
                retry_after_ms: retry_after,
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(CompletionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.json::<CompletionResponse>().await?;
        Ok(body)
    }
}
