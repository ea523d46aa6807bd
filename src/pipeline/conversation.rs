//! Conversation stage: clarify the request, confirm it, then hand over a structured intent
//!
//! The model answers in plain language while it is still listening. Once it
//! has paraphrased the request it attaches a draft intent with
//! `"confirmed": false`; after the user agrees it replies with only the intent
//! JSON and `"confirmed": true`. Anything that is not a confirmed intent goes
//! back to the user unchanged.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::extract_json_object;
use crate::context::ContextWindow;
use crate::error::Result;
use crate::intent::{IntentSummary, IntentSummaryWire, TemplateCatalog};
use crate::llm::{CompletionClient, CompletionRequest};

/// Where the dialogue stands after a conversational reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogueStage {
    Listening,
    AwaitingConfirmation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConversationOutcome {
    /// Natural-language reply to show the user
    Reply {
        text: String,
        stage: DialogueStage,
        /// Unconfirmed intent the model paraphrased, if any
        draft: Option<Value>,
        tokens_used: u32,
    },
    /// The user confirmed; proceed to preparation
    Confirmed {
        summary: IntentSummary,
        tokens_used: u32,
    },
}

/// Interpret a model reply as an intent summary.
///
/// Returns `Ok(None)` when the text holds no intent JSON or the intent is not
/// confirmed; an unknown intent name on a confirmed summary is an error.
pub fn parse_intent_summary(text: &str) -> Result<Option<IntentSummary>> {
    let Some(wire) = parse_wire(text) else {
        return Ok(None);
    };
    if !wire.confirmed {
        return Ok(None);
    }
    Ok(Some(IntentSummary::try_from(wire)?))
}

fn parse_wire(text: &str) -> Option<IntentSummaryWire> {
    let json = extract_json_object(text)?;
    serde_json::from_str::<IntentSummaryWire>(json).ok()
}

pub struct ConversationStage {
    client: Arc<dyn CompletionClient>,
    system_prompt: String,
    temperature: f32,
    max_tokens: u32,
}

impl ConversationStage {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        catalog: &TemplateCatalog,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            client,
            system_prompt: Self::render_system_prompt(catalog),
            temperature,
            max_tokens,
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn render_system_prompt(catalog: &TemplateCatalog) -> String {
        let intents = catalog
            .templates()
            .map(|t| format!("- {}: {}", t.intent, t.description))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"You help the user restructure the content of their project.

You can carry out these intents:
{intents}

How to talk with the user:
1. Understand what they want from what they say, not from keywords. If something important is unclear, ask exactly one clarifying question and wait.
2. When you understand the request, paraphrase it in one or two sentences and ask the user to confirm before anything changes. End that message with the draft intent as JSON with "confirmed": false.
3. If the user confirms, reply with ONLY this JSON object and no other text:
{{"intent": "<intent>", "useCurrentOrder": <true|false>, "goals": ["..."], "specificRequests": ["..."], "userContext": "...", "confirmed": true}}
4. If the user rejects or changes the request, go back to step 1.
Never claim a change was made; the system applies changes after confirmation."#
        )
    }

    #[instrument(skip(self, window), fields(model = %model, history = window.messages.len(), trimmed = window.trimmed_count))]
    pub async fn run(&self, window: &ContextWindow, model: &str) -> Result<ConversationOutcome> {
        let request = CompletionRequest::new(model, &window.system_prompt, &window.new_message)
            .with_history(window.history())
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature);

        let completion = self.client.complete(request).await?;
        let text = completion.text.trim().to_string();

        if let Some(summary) = parse_intent_summary(&text)? {
            info!(intent = %summary.intent, "Conversation produced confirmed intent");
            return Ok(ConversationOutcome::Confirmed {
                summary,
                tokens_used: completion.tokens_used,
            });
        }

        let draft = parse_wire(&text)
            .filter(|wire| !wire.confirmed)
            .and_then(|wire| serde_json::to_value(wire).ok());
        let stage = if draft.is_some() {
            DialogueStage::AwaitingConfirmation
        } else {
            DialogueStage::Listening
        };
        debug!(?stage, "Conversation continues");

        Ok(ConversationOutcome::Reply {
            text,
            stage,
            draft,
            tokens_used: completion.tokens_used,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::IntentKind;

    #[test]
    fn test_plain_text_is_not_an_intent() {
        assert!(parse_intent_summary("What tone are you going for?").unwrap().is_none());
    }

    #[test]
    fn test_unconfirmed_intent_is_not_returned() {
        let text = r#"You want a stronger opening, right? {"intent":"reorder","confirmed":false}"#;
        assert!(parse_intent_summary(text).unwrap().is_none());
    }

    #[test]
    fn test_confirmed_intent_with_surrounding_text() {
        let text = "```json\n{\"intent\":\"reorder\",\"useCurrentOrder\":true,\"goals\":[\"stronger opening\"],\"specificRequests\":[],\"userContext\":\"\",\"confirmed\":true}\n```";
        let summary = parse_intent_summary(text).unwrap().unwrap();
        assert_eq!(summary.intent, IntentKind::Reorder);
        assert!(summary.use_current_order);
        assert_eq!(summary.goals, vec!["stronger opening"]);
    }

    #[test]
    fn test_confirmed_unknown_intent_is_error() {
        let err = parse_intent_summary(r#"{"intent":"translate","confirmed":true}"#).unwrap_err();
        assert_eq!(err.kind(), "unknown_intent_error");
    }

    #[test]
    fn test_system_prompt_lists_catalog_intents() {
        let prompt = ConversationStage::render_system_prompt(&TemplateCatalog::builtin());
        assert!(prompt.contains("- reorder:"));
        assert!(prompt.contains("- group:"));
        assert!(prompt.contains("- analyze:"));
        assert!(prompt.contains("\"confirmed\": true"));
    }
}
