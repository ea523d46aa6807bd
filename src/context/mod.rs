//! Bounded prompt context for a conversation turn
//!
//! The builder keeps the system prompt and the new user message, reserves a
//! fixed budget for the model's reply, then fills the remaining space with
//! history from newest to oldest. Anything older that does not fit is replaced
//! by a single deterministic summary message when that summary still fits.

mod summary;

pub use summary::{SUMMARY_MAX_CHARS, summarize_trimmed};

use tracing::debug;

use crate::error::{MontageError, Result};
use crate::llm::{ChatMessage, TokenBudgeter, estimate_message_tokens};
use crate::session::{Message, MessageRole};

/// Budget-respecting slice of a conversation, built fresh for every request
#[derive(Debug, Clone, PartialEq)]
pub struct ContextWindow {
    pub system_prompt: String,
    /// Included history, oldest first
    pub messages: Vec<ChatMessage>,
    pub trimmed_count: usize,
    pub summary: Option<String>,
    pub new_message: String,
    /// Estimated tokens of everything above (reserved response budget excluded)
    pub total_tokens: u64,
    pub limit: u64,
    pub reserved_response_tokens: u64,
}

impl ContextWindow {
    /// History as sent to the model: summary (if any) followed by included messages
    pub fn history(&self) -> Vec<ChatMessage> {
        let mut history = Vec::with_capacity(self.messages.len() + 1);
        if let Some(summary) = &self.summary {
            history.push(ChatMessage::system(summary.clone()));
        }
        history.extend(self.messages.iter().cloned());
        history
    }

    /// Tokens left over after the window and the reserved reply budget
    pub fn headroom(&self) -> u64 {
        self.limit
            .saturating_sub(self.total_tokens + self.reserved_response_tokens)
    }
}

/// Model-facing form of a stored message; hidden context is appended for the model only
pub fn to_model_message(message: &Message) -> ChatMessage {
    let content = match &message.hidden_context {
        Some(hidden) if !hidden.is_empty() => format!("{}\n\n[context]\n{}", message.content, hidden),
        _ => message.content.clone(),
    };
    match message.role {
        MessageRole::User => ChatMessage::user(content),
        MessageRole::Assistant => ChatMessage::assistant(content),
        MessageRole::System => ChatMessage::system(content),
        MessageRole::Error => ChatMessage::assistant(format!("(request failed) {}", content)),
    }
}

pub struct ContextWindowBuilder {
    budgeter: TokenBudgeter,
    reserved_response_tokens: u64,
}

impl ContextWindowBuilder {
    pub fn new(budgeter: TokenBudgeter, reserved_response_tokens: u64) -> Self {
        Self {
            budgeter,
            reserved_response_tokens,
        }
    }

    pub fn budgeter(&self) -> &TokenBudgeter {
        &self.budgeter
    }

    /// Build the window for `new_message` on top of `history` (oldest first).
    ///
    /// Fails with `ContextBudget` when the system prompt, the new message and the
    /// reserved reply budget alone exceed the model's limit; the new message is
    /// never truncated.
    pub fn build(
        &self,
        system_prompt: &str,
        history: &[Message],
        new_message: &str,
        model: &str,
    ) -> Result<ContextWindow> {
        let limit = self.budgeter.limit_for(model);
        let fixed = estimate_message_tokens(system_prompt) + estimate_message_tokens(new_message);
        let required = fixed + self.reserved_response_tokens;
        if required > limit {
            return Err(MontageError::ContextBudget { required, limit });
        }
        let available = limit - required;

        let candidates: Vec<(ChatMessage, u64)> = history
            .iter()
            .map(|m| {
                let chat = to_model_message(m);
                let cost = estimate_message_tokens(&chat.content);
                (chat, cost)
            })
            .collect();
        let history_cost: u64 = candidates.iter().map(|(_, c)| c).sum();

        if history_cost <= available {
            return Ok(ContextWindow {
                system_prompt: system_prompt.to_string(),
                messages: candidates.into_iter().map(|(m, _)| m).collect(),
                trimmed_count: 0,
                summary: None,
                new_message: new_message.to_string(),
                total_tokens: fixed + history_cost,
                limit,
                reserved_response_tokens: self.reserved_response_tokens,
            });
        }

        // Hold back room for the worst-case summary before filling history
        let summary_reserve = estimate_message_tokens(&"x".repeat(SUMMARY_MAX_CHARS));
        let fill_budget = available.saturating_sub(summary_reserve);

        let mut used = 0u64;
        let mut first_included = candidates.len();
        for (idx, (_, cost)) in candidates.iter().enumerate().rev() {
            if used + cost > fill_budget {
                break;
            }
            used += cost;
            first_included = idx;
        }

        let trimmed = &history[..first_included];
        let summary_text = summarize_trimmed(trimmed);
        let summary_cost = estimate_message_tokens(&summary_text);
        let summary = if used + summary_cost <= available {
            used += summary_cost;
            Some(summary_text)
        } else {
            None
        };

        debug!(
            model,
            limit,
            included = candidates.len() - first_included,
            trimmed = first_included,
            has_summary = summary.is_some(),
            "Trimmed conversation history to fit context"
        );

        Ok(ContextWindow {
            system_prompt: system_prompt.to_string(),
            messages: candidates
                .into_iter()
                .skip(first_included)
                .map(|(m, _)| m)
                .collect(),
            trimmed_count: first_included,
            summary,
            new_message: new_message.to_string(),
            total_tokens: fixed + used,
            limit,
            reserved_response_tokens: self.reserved_response_tokens,
        })
    }
}
