// src/llm/http_client.rs
// Shared HTTP transport for completion providers

use reqwest::Client;
use std::time::Duration;
use tracing::warn;

use crate::error::{MontageError, Result};

/// Default base backoff duration between retries (doubles each attempt)
const DEFAULT_BASE_BACKOFF_MS: u64 = 500;

/// HTTP client with bounded retries for transient completion-service failures
pub struct LlmHttpClient {
    client: Client,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Extra attempts after the first one
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl LlmHttpClient {
    pub fn new(request_timeout: Duration, connect_timeout: Duration, max_retries: u32) -> Self {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            request_timeout,
            connect_timeout,
            max_retries,
            base_backoff: Duration::from_millis(DEFAULT_BASE_BACKOFF_MS),
        }
    }

    pub fn with_base_backoff(mut self, backoff: Duration) -> Self {
        self.base_backoff = backoff;
        self
    }

    /// POST a JSON body with optional Bearer auth, retrying 429/5xx and connect/timeout errors.
    ///
    /// Returns the response body as text on success. Exhausted transient failures come
    /// back as retryable `LlmCall` errors, other HTTP errors as non-retryable ones.
    pub async fn post_json_with_retry(
        &self,
        request_id: &str,
        url: &str,
        api_key: Option<&str>,
        body: String,
    ) -> Result<String> {
        let mut attempts = 0;
        let mut backoff = self.base_backoff;

        loop {
            let mut builder = self
                .client
                .post(url)
                .header("Content-Type", "application/json")
                .body(body.clone());
            if let Some(key) = api_key {
                builder = builder.bearer_auth(key);
            }

            match builder.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response.text().await?);
                    }

                    let error_body = response.text().await.unwrap_or_default();
                    let transient = status.as_u16() == 429 || status.is_server_error();
                    if transient && attempts < self.max_retries {
                        warn!(
                            request_id = %request_id,
                            status = %status,
                            error = %error_body,
                            "Transient completion error, retrying in {:?}",
                            backoff
                        );
                        tokio::time::sleep(backoff).await;
                        attempts += 1;
                        backoff *= 2;
                        continue;
                    }

                    return Err(MontageError::llm(
                        format!("API error {}: {}", status, error_body),
                        transient,
                    ));
                }
                Err(e) => {
                    // Other send errors may mean the request was processed; don't resend
                    let transient = e.is_connect() || e.is_timeout();
                    if transient && attempts < self.max_retries {
                        warn!(
                            request_id = %request_id,
                            error = %e,
                            "Completion request failed (connect/timeout), retrying in {:?}",
                            backoff
                        );
                        tokio::time::sleep(backoff).await;
                        attempts += 1;
                        backoff *= 2;
                        continue;
                    }
                    return Err(MontageError::llm(
                        format!("request failed after {} attempt(s): {}", attempts + 1, e),
                        transient,
                    ));
                }
            }
        }
    }
}
