//! Execution stage: one self-contained prompt in, structured output back
//!
//! No function access and no conversation history. Retryable failures
//! (transport errors that survived the HTTP client's own retries, and
//! unparseable output) get one more attempt with the failure fed back.

use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::{PreparedExecution, StructuredExecutionOutput, extract_json_object};
use crate::error::{MontageError, Result};
use crate::llm::{CompletionClient, CompletionRequest};

/// Attempts including the first one
pub const MAX_EXECUTION_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub output: StructuredExecutionOutput,
    pub attempts: u32,
    pub tokens_used: u32,
}

/// Decode the model's text into `StructuredExecutionOutput`, ignoring text around the JSON object
pub fn parse_execution_output(text: &str) -> Result<StructuredExecutionOutput> {
    let json = extract_json_object(text)
        .ok_or_else(|| MontageError::Parse("no JSON object found in response".to_string()))?;
    serde_json::from_str(json).map_err(|e| MontageError::Parse(e.to_string()))
}

pub struct ExecutionStage {
    client: Arc<dyn CompletionClient>,
    temperature: f32,
    max_tokens: u32,
    max_attempts: u32,
}

impl ExecutionStage {
    pub fn new(client: Arc<dyn CompletionClient>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            client,
            temperature,
            max_tokens,
            max_attempts: MAX_EXECUTION_ATTEMPTS,
        }
    }

    #[instrument(skip(self, prepared), fields(intent = %prepared.input.intent, model = %model))]
    pub async fn execute(
        &self,
        prepared: &PreparedExecution,
        model: &str,
    ) -> Result<ExecutionOutcome> {
        let mut prompt = prepared.prompt.clone();
        let mut tokens_used = 0u32;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let request = CompletionRequest::new(model, &prepared.system_prompt, &prompt)
                .with_max_tokens(self.max_tokens)
                .with_temperature(self.temperature);

            let result = match self.client.complete(request).await {
                Ok(completion) => {
                    tokens_used = tokens_used.saturating_add(completion.tokens_used);
                    parse_execution_output(&completion.text)
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(mut output) => {
                    let markers = output.section_markers();
                    if output.section_count != markers {
                        warn!(
                            reported = output.section_count,
                            actual = markers,
                            "Section count disagrees with markers, using marker count"
                        );
                        output.section_count = markers;
                    }
                    info!(attempt, tokens_used, success = output.success, "Execution complete");
                    return Ok(ExecutionOutcome {
                        output,
                        attempts: attempt,
                        tokens_used,
                    });
                }
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!(attempt, error = %e, "Execution attempt failed, retrying with correction");
                    prompt = format!(
                        "{}\n\n## Previous attempt failed\n{}\nReply again with only the JSON object in the required format.",
                        prepared.prompt, e
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}
