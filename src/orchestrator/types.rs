// src/orchestrator/types.rs
// Caller-facing request and response shapes (camelCase JSON)

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MontageError, Result};
use crate::functions::{FunctionResultSummary, parse_context_payload};
use crate::session::PublicMessage;

/// Longest accepted user message, in characters
pub const MAX_MESSAGE_CHARS: usize = 32_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub project_id: String,
    pub topic_id: String,
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub context_data: Value,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub enable_function_calls: Option<bool>,
    #[serde(default)]
    pub mode: Option<String>,
}

/// Whether a confirmed intent is carried out or only proposed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    Execute,
    Plan,
}

impl ChatRequest {
    pub fn new(
        project_id: impl Into<String>,
        topic_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            topic_id: topic_id.into(),
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_context_data(mut self, context_data: Value) -> Self {
        self.context_data = context_data;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    /// Reject malformed requests before any stage runs
    pub fn validate(&self) -> Result<RequestMode> {
        if self.project_id.trim().is_empty() {
            return Err(MontageError::Validation("projectId is required".into()));
        }
        if self.topic_id.trim().is_empty() {
            return Err(MontageError::Validation("topicId is required".into()));
        }
        if self.message.trim().is_empty() {
            return Err(MontageError::Validation("message must not be empty".into()));
        }
        if self.message.chars().count() > MAX_MESSAGE_CHARS {
            return Err(MontageError::Validation(format!(
                "message exceeds {} characters",
                MAX_MESSAGE_CHARS
            )));
        }
        if !(self.context_data.is_null() || self.context_data.is_object()) {
            return Err(MontageError::Validation(
                "contextData must be an object".into(),
            ));
        }
        parse_context_payload(&self.context_data)?;
        if let Some(model) = &self.model {
            if model.trim().is_empty() {
                return Err(MontageError::Validation("model must not be blank".into()));
            }
        }

        let mode = match self.mode.as_deref().map(str::trim) {
            None | Some("") | Some("execute") => RequestMode::Execute,
            Some("plan") => RequestMode::Plan,
            Some(other) => {
                return Err(MontageError::Validation(format!(
                    "unknown mode '{}', expected 'execute' or 'plan'",
                    other
                )));
            }
        };
        if self.enable_function_calls == Some(false) {
            return Ok(RequestMode::Plan);
        }
        Ok(mode)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub session_id: String,
    pub message_id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_results: Option<Vec<FunctionResultSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions_available: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions_performed: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_actions: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    /// None when no message was ever sent for this (project, topic)
    pub session_id: Option<String>,
    pub messages: Vec<PublicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearResponse {
    pub success: bool,
    pub deleted_messages: u64,
}
