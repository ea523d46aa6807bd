// src/llm/openai_compat.rs
// OpenAI-compatible /chat/completions client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{Span, debug, info, instrument};
use uuid::Uuid;

use super::http_client::LlmHttpClient;
use super::{ChatMessage, Completion, CompletionClient, CompletionRequest};
use crate::config::CompletionConfig;
use crate::error::{MontageError, Result};

/// Chat completion request body (OpenAI-compatible format)
#[derive(Debug, Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseBody {
    #[serde(default)]
    choices: Vec<ResponseChoice>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u32,
}

/// Parse an OpenAI-compatible chat response into a `Completion`.
///
/// A response without any choice content is a non-retryable `LlmCall` error.
pub fn parse_completion_response(
    response_body: &str,
    requested_model: &str,
    duration_ms: u64,
) -> Result<Completion> {
    let data: ChatResponseBody = serde_json::from_str(response_body).map_err(|e| {
        MontageError::llm(format!("failed to parse chat response: {}", e), false)
    })?;

    let text = data
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| MontageError::llm("completion response had no content", false))?;

    Ok(Completion {
        text,
        tokens_used: data.usage.map(|u| u.total_tokens).unwrap_or(0),
        model: data.model.unwrap_or_else(|| requested_model.to_string()),
        duration_ms,
    })
}

/// Client for any OpenAI-compatible endpoint (OpenAI, gateways, local servers)
pub struct OpenAiCompatClient {
    endpoint: String,
    api_key: Option<String>,
    http: LlmHttpClient,
}

impl OpenAiCompatClient {
    pub fn new(config: &CompletionConfig) -> Self {
        let http = LlmHttpClient::new(
            config.request_timeout,
            config.connect_timeout,
            config.max_attempts.saturating_sub(1),
        );
        Self {
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            http,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatClient {
    #[instrument(skip(self, request), fields(request_id, model = %request.model, history = request.history.len()))]
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let request_id = Uuid::new_v4().to_string();
        let start_time = Instant::now();
        Span::current().record("request_id", &request_id);

        let body = ChatRequestBody {
            model: &request.model,
            messages: request.to_messages(),
            max_tokens: Some(request.max_tokens),
            temperature: Some(request.temperature),
        };
        let body = serde_json::to_string(&body)?;
        debug!(request_id = %request_id, bytes = body.len(), "Sending completion request");

        let response_body = self
            .http
            .post_json_with_retry(&request_id, &self.endpoint, self.api_key.as_deref(), body)
            .await?;

        let duration_ms = start_time.elapsed().as_millis() as u64;
        let completion = parse_completion_response(&response_body, &request.model, duration_ms)?;

        info!(
            request_id = %request_id,
            tokens_used = completion.tokens_used,
            duration_ms,
            "Completion finished"
        );
        Ok(completion)
    }

    fn provider_name(&self) -> &str {
        "openai-compatible"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_simple_response() {
        let json = r#"{
            "model": "gpt-4o-mini-2024",
            "choices": [{"message": {"content": "Hello, world!"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }"#;
        let completion = parse_completion_response(json, "gpt-4o-mini", 100).unwrap();
        assert_eq!(completion.text, "Hello, world!");
        assert_eq!(completion.tokens_used, 15);
        assert_eq!(completion.model, "gpt-4o-mini-2024");
        assert_eq!(completion.duration_ms, 100);
    }

    #[test]
    fn test_parse_missing_usage_and_model() {
        let json = r#"{"choices": [{"message": {"content": "ok"}}]}"#;
        let completion = parse_completion_response(json, "requested", 0).unwrap();
        assert_eq!(completion.tokens_used, 0);
        assert_eq!(completion.model, "requested");
    }

    #[test]
    fn test_parse_invalid_json() {
        let err = parse_completion_response("not json", "m", 0).unwrap_err();
        assert!(matches!(err, MontageError::LlmCall { retryable: false, .. }));
    }

    #[test]
    fn test_parse_empty_choices() {
        let err = parse_completion_response(r#"{"choices": []}"#, "m", 0).unwrap_err();
        assert!(err.to_string().contains("no content"));
    }

    #[test]
    fn test_request_body_serialization() {
        let body = ChatRequestBody {
            model: "m",
            messages: vec![ChatMessage::system("s"), ChatMessage::user("u")],
            max_tokens: Some(10),
            temperature: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["max_tokens"], 10);
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let config = CompletionConfig {
            base_url: "http://localhost:8080/v1/".into(),
            ..CompletionConfig::default()
        };
        let client = OpenAiCompatClient::new(&config);
        assert_eq!(client.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_retryable() {
        let config = CompletionConfig {
            base_url: "http://127.0.0.1:1".into(),
            request_timeout: Duration::from_millis(500),
            connect_timeout: Duration::from_millis(200),
            max_attempts: 1,
            ..CompletionConfig::default()
        };
        let client = OpenAiCompatClient::new(&config);
        let err = client
            .complete(CompletionRequest::new("m", "s", "u"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
