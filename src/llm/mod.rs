// src/llm/mod.rs
// Completion service abstraction, token budgeting and the HTTP client

mod budget;
pub mod http_client;
mod openai_compat;

pub use budget::{
    DEFAULT_CONTEXT_LIMIT, MESSAGE_OVERHEAD_TOKENS, TokenBudgeter, estimate_message_tokens,
    estimate_tokens,
};
pub use openai_compat::{OpenAiCompatClient, parse_completion_response};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Roles understood by chat-style completion APIs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One message of model-facing conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A single completion call: system prompt, prior turns, and the new user prompt
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system_prompt: String,
    pub history: Vec<ChatMessage>,
    pub user_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            system_prompt: system_prompt.into(),
            history: Vec::new(),
            user_prompt: user_prompt.into(),
            max_tokens: 1024,
            temperature: 0.7,
        }
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Flatten into the wire message list (system, history..., user)
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt.clone()));
        messages.extend(self.history.iter().cloned());
        messages.push(ChatMessage::user(self.user_prompt.clone()));
        messages
    }
}

/// Text returned by the completion service
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub tokens_used: u32,
    pub model: String,
    pub duration_ms: u64,
}

/// Anything that can answer a completion request (direct provider, gateway, test double)
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;

    /// Short provider label for logs
    fn provider_name(&self) -> &str;
}
