//! Flow orchestrator: sequences the pipeline for each chat turn and owns persistence
//!
//! A turn holds its session's lock from before the user message is stored
//! until the reply (or error) message is stored, so turns on one session never
//! interleave. Stage failures become an error-role message and a
//! `success: false` response; the session stays usable.

mod apply;
mod types;

pub use apply::{AppliedChange, ChangeApplier, SqliteChangeApplier};
pub use types::{
    ChatRequest, ChatResponse, ClearResponse, HistoryResponse, MAX_MESSAGE_CHARS, RequestMode,
};

use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::context::ContextWindowBuilder;
use crate::error::{MontageError, Result};
use crate::functions::{FunctionRegistry, FunctionResultSummary, ProjectScope};
use crate::intent::{IntentKind, IntentSummary, TemplateCatalog};
use crate::llm::{CompletionClient, TokenBudgeter};
use crate::pipeline::{
    ConversationOutcome, ConversationStage, DialogueStage, ExecutionOutcome, ExecutionStage,
    OutputValidator, PreparationStage, StructuredExecutionInput,
};
use crate::session::{Message, NewMessage, Session, SessionLocks, SessionStore};

/// Collaborators the orchestrator is built from
pub struct EngineParts {
    pub client: Arc<dyn CompletionClient>,
    pub store: Arc<dyn SessionStore>,
    pub registry: Arc<FunctionRegistry>,
    pub catalog: Arc<TemplateCatalog>,
    pub applier: Arc<dyn ChangeApplier>,
}

/// What the cancellable part of a turn produced
enum TurnOutcome {
    Reply {
        text: String,
        stage: DialogueStage,
        draft: Option<Value>,
    },
    Planned {
        summary: IntentSummary,
    },
    Executed {
        summary: IntentSummary,
        input: StructuredExecutionInput,
        outcome: ExecutionOutcome,
        function_results: Vec<FunctionResultSummary>,
    },
    Failed {
        error: MontageError,
        function_results: Vec<FunctionResultSummary>,
    },
}

pub struct FlowOrchestrator {
    store: Arc<dyn SessionStore>,
    locks: SessionLocks,
    context: ContextWindowBuilder,
    conversation: ConversationStage,
    preparation: PreparationStage,
    execution: ExecutionStage,
    validator: OutputValidator,
    applier: Arc<dyn ChangeApplier>,
    catalog: Arc<TemplateCatalog>,
    default_model: String,
    turn_timeout: Duration,
}

impl FlowOrchestrator {
    pub fn new(parts: EngineParts, config: &EngineConfig) -> Self {
        let stages = &config.stages;
        let budgeter = TokenBudgeter::new(config.model_limits.clone());
        Self {
            store: parts.store,
            locks: SessionLocks::new(),
            context: ContextWindowBuilder::new(budgeter, stages.reserved_response_tokens),
            conversation: ConversationStage::new(
                parts.client.clone(),
                &parts.catalog,
                stages.conversation_temperature,
                stages.conversation_max_tokens,
            ),
            preparation: PreparationStage::new(parts.registry, parts.catalog.clone()),
            execution: ExecutionStage::new(
                parts.client,
                stages.execution_temperature,
                stages.execution_max_tokens,
            ),
            validator: OutputValidator,
            applier: parts.applier,
            catalog: parts.catalog,
            default_model: config.completion.default_model.clone(),
            turn_timeout: stages.turn_timeout,
        }
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn intents(&self) -> Vec<IntentKind> {
        self.catalog.templates().map(|t| t.intent).collect()
    }

    pub fn locks(&self) -> &SessionLocks {
        &self.locks
    }

    /// Process one chat turn
    pub async fn handle_turn(&self, request: ChatRequest) -> Result<ChatResponse> {
        self.handle_turn_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Process one chat turn, aborting when `cancel` fires or the turn deadline passes.
    ///
    /// Returns `Err` only for invalid requests, an unreachable session store, or
    /// cancellation. A cancelled turn keeps its user message and stores nothing else.
    #[instrument(skip(self, request, cancel), fields(project_id = %request.project_id, topic_id = %request.topic_id, session_id))]
    pub async fn handle_turn_with_cancel(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatResponse> {
        let mode = request.validate()?;

        let lock = self
            .locks
            .get_lock(&request.project_id, &request.topic_id)
            .await;
        let _guard = tokio::select! {
            guard = lock.lock() => guard,
            _ = cancel.cancelled() => return Err(MontageError::Cancelled),
        };
        debug!("Acquired session lock");

        // A caller-supplied id must match the existing session; checked before anything is created
        if let Some(requested) = &request.session_id {
            let existing = self
                .store
                .get_session(&request.project_id, &request.topic_id)
                .await?;
            if existing.as_ref().map(|s| s.id.as_str()) != Some(requested.as_str()) {
                return Err(MontageError::Validation(format!(
                    "sessionId '{}' does not belong to this project and topic",
                    requested
                )));
            }
        }

        let session = self
            .store
            .find_or_create_session(&request.project_id, &request.topic_id)
            .await?;
        Span::current().record("session_id", session.id.as_str());

        let model = request
            .model
            .clone()
            .or_else(|| session.selected_model.clone())
            .unwrap_or_else(|| self.default_model.clone());
        if session.selected_model.as_deref() != Some(model.as_str()) {
            if let Err(e) = self.store.set_selected_model(&session.id, &model).await {
                warn!(error = %e, "Failed to remember model selection");
            }
        }

        let history = match self.store.list_messages(&session.id).await {
            Ok(history) => history,
            Err(e) => {
                warn!(error = %e, "Failed to load history, continuing without it");
                Vec::new()
            }
        };

        if let Err(e) = self
            .store
            .append_message(&session.id, NewMessage::user(&request.message))
            .await
        {
            warn!(error = %e, "Failed to persist user message");
        }

        let scope = ProjectScope::new(
            &request.project_id,
            &request.topic_id,
            request.context_data.clone(),
        );

        let stages = self.run_stages(&scope, &history, &request.message, &model, mode);
        let outcome = tokio::select! {
            result = tokio::time::timeout(self.turn_timeout, stages) => match result {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(timeout = ?self.turn_timeout, "Turn deadline exceeded");
                    return Err(MontageError::Cancelled);
                }
            },
            _ = cancel.cancelled() => {
                info!("Turn cancelled by caller");
                return Err(MontageError::Cancelled);
            }
        };

        Ok(self.finish_turn(&session, &scope, &model, outcome).await)
    }

    /// Conversation, then (once confirmed) preparation, execution and validation.
    /// Nothing here writes to the session store.
    async fn run_stages(
        &self,
        scope: &ProjectScope,
        history: &[Message],
        message: &str,
        model: &str,
        mode: RequestMode,
    ) -> TurnOutcome {
        let window = match self
            .context
            .build(self.conversation.system_prompt(), history, message, model)
        {
            Ok(window) => window,
            Err(error) => {
                return TurnOutcome::Failed {
                    error,
                    function_results: Vec::new(),
                };
            }
        };

        let summary = match self.conversation.run(&window, model).await {
            Ok(ConversationOutcome::Reply {
                text, stage, draft, ..
            }) => return TurnOutcome::Reply { text, stage, draft },
            Ok(ConversationOutcome::Confirmed { summary, .. }) => summary,
            Err(error) => {
                return TurnOutcome::Failed {
                    error,
                    function_results: Vec::new(),
                };
            }
        };

        if mode == RequestMode::Plan {
            return TurnOutcome::Planned { summary };
        }

        let mut function_results = Vec::new();
        let prepared = match self
            .preparation
            .prepare(&summary, scope, &mut function_results)
            .await
        {
            Ok(prepared) => prepared,
            Err(error) => {
                return TurnOutcome::Failed {
                    error,
                    function_results,
                };
            }
        };

        let outcome = match self.execution.execute(&prepared, model).await {
            Ok(outcome) => outcome,
            Err(error) => {
                return TurnOutcome::Failed {
                    error,
                    function_results,
                };
            }
        };

        if let Err(error) = self.validator.validate(&prepared.input, &outcome.output) {
            return TurnOutcome::Failed {
                error,
                function_results,
            };
        }

        TurnOutcome::Executed {
            summary,
            input: prepared.input,
            outcome,
            function_results,
        }
    }

    /// Apply (if needed) and persist the turn's reply, then build the response
    async fn finish_turn(
        &self,
        session: &Session,
        scope: &ProjectScope,
        model: &str,
        outcome: TurnOutcome,
    ) -> ChatResponse {
        let base = ChatResponse {
            session_id: session.id.clone(),
            model: Some(model.to_string()),
            ..ChatResponse::default()
        };

        match outcome {
            TurnOutcome::Reply { text, stage, draft } => {
                let hidden = json!({ "stage": stage, "draft": draft });
                let message_id = self
                    .persist(
                        &session.id,
                        NewMessage::assistant(&text)
                            .with_hidden_context(hidden.to_string())
                            .with_model(model),
                    )
                    .await;
                ChatResponse {
                    message_id,
                    message: text,
                    success: true,
                    has_actions: Some(false),
                    ..base
                }
            }

            TurnOutcome::Planned { summary } => {
                let text = describe_plan(&summary);
                let hidden = json!({ "stage": "planned", "intent": summary });
                let message_id = self
                    .persist(
                        &session.id,
                        NewMessage::assistant(&text)
                            .with_hidden_context(hidden.to_string())
                            .with_model(model),
                    )
                    .await;
                info!(intent = %summary.intent, "Planned intent without executing");
                ChatResponse {
                    message_id,
                    message: text,
                    success: true,
                    actions_available: Some(vec![json!({
                        "type": summary.intent,
                        "intent": summary,
                    })]),
                    has_actions: Some(true),
                    ..base
                }
            }

            TurnOutcome::Executed {
                summary,
                input,
                outcome,
                function_results,
            } => {
                let change_id = if summary.intent.is_ordering() {
                    match self.applier.apply(scope, summary.intent, &outcome.output).await {
                        Ok(id) => Some(id),
                        Err(error) => {
                            return self.fail_turn(session, model, error, function_results, base).await;
                        }
                    }
                } else {
                    None
                };

                let action_summary = describe_execution(&summary, &input, &outcome);
                let text = if outcome.output.reasoning.trim().is_empty() {
                    action_summary.clone()
                } else {
                    format!("{}\n\n{}", action_summary, outcome.output.reasoning.trim())
                };
                let hidden = json!({
                    "stage": "executed",
                    "intent": summary,
                    "output": outcome.output,
                    "changeId": change_id,
                });
                let message_id = self
                    .persist(
                        &session.id,
                        NewMessage::assistant(&text)
                            .with_hidden_context(hidden.to_string())
                            .with_model(model),
                    )
                    .await;

                info!(
                    intent = %summary.intent,
                    attempts = outcome.attempts,
                    changes = outcome.output.changes.len(),
                    "Executed intent"
                );
                ChatResponse {
                    message_id,
                    message: text,
                    success: true,
                    function_results: Some(function_results),
                    actions_performed: Some(vec![json!({
                        "type": summary.intent,
                        "changeId": change_id,
                        "newOrder": outcome.output.new_order,
                        "sectionCount": outcome.output.section_count,
                        "changes": outcome.output.changes,
                        "reasoning": outcome.output.reasoning,
                        "attempts": outcome.attempts,
                    })]),
                    action_summary: Some(action_summary),
                    has_actions: Some(true),
                    ..base
                }
            }

            TurnOutcome::Failed {
                error,
                function_results,
            } => self.fail_turn(session, model, error, function_results, base).await,
        }
    }

    async fn fail_turn(
        &self,
        session: &Session,
        model: &str,
        error: MontageError,
        function_results: Vec<FunctionResultSummary>,
        base: ChatResponse,
    ) -> ChatResponse {
        warn!(kind = error.kind(), error = %error, "Turn failed");
        let text = error.to_user_string();
        let hidden = json!({ "stage": "failed", "errorKind": error.kind() });
        let message_id = self
            .persist(
                &session.id,
                NewMessage::error(&text)
                    .with_hidden_context(hidden.to_string())
                    .with_model(model),
            )
            .await;
        ChatResponse {
            message_id,
            message: text.clone(),
            success: false,
            error: Some(text),
            function_results: (!function_results.is_empty()).then_some(function_results),
            has_actions: Some(false),
            ..base
        }
    }

    /// Best-effort append; a storage failure never fails the turn
    async fn persist(&self, session_id: &str, message: NewMessage) -> String {
        match self.store.append_message(session_id, message).await {
            Ok(stored) => stored.id,
            Err(e) => {
                warn!(session_id, error = %e, "Failed to persist reply message");
                Uuid::new_v4().to_string()
            }
        }
    }

    /// Caller-facing history; never creates a session
    pub async fn history(&self, project_id: &str, topic_id: &str) -> Result<HistoryResponse> {
        validate_key(project_id, topic_id)?;
        let Some(session) = self.store.get_session(project_id, topic_id).await? else {
            return Ok(HistoryResponse {
                session_id: None,
                messages: Vec::new(),
                selected_model: None,
            });
        };
        let messages = self.store.public_history(&session.id).await?;
        Ok(HistoryResponse {
            session_id: Some(session.id),
            messages,
            selected_model: session.selected_model,
        })
    }

    /// Delete a session's messages; waits for any running turn on that session
    pub async fn clear(&self, project_id: &str, topic_id: &str) -> Result<ClearResponse> {
        validate_key(project_id, topic_id)?;
        let deleted_messages = {
            let lock = self.locks.get_lock(project_id, topic_id).await;
            let _guard = lock.lock().await;
            self.store.clear_session(project_id, topic_id).await?
        };
        let released = self.locks.cleanup_unused().await;
        debug!(released, "Released idle session locks");
        Ok(ClearResponse {
            success: true,
            deleted_messages,
        })
    }
}

fn validate_key(project_id: &str, topic_id: &str) -> Result<()> {
    if project_id.trim().is_empty() || topic_id.trim().is_empty() {
        return Err(MontageError::Validation(
            "projectId and topicId are required".into(),
        ));
    }
    Ok(())
}

fn bullet_list(lines: &[String]) -> String {
    lines
        .iter()
        .map(|l| format!("- {}", l))
        .collect::<Vec<_>>()
        .join("\n")
}

fn describe_plan(summary: &IntentSummary) -> String {
    let mut text = format!("Planned: {} the project items", summary.intent);
    if !summary.goals.is_empty() {
        text.push_str(&format!(" to {}", summary.goals.join(", ")));
    }
    text.push('.');
    if !summary.specific_requests.is_empty() {
        text.push_str("\nRequests:\n");
        text.push_str(&bullet_list(&summary.specific_requests));
    }
    text.push_str("\nSend it again in execute mode to apply it.");
    text
}

fn describe_execution(
    summary: &IntentSummary,
    input: &StructuredExecutionInput,
    outcome: &ExecutionOutcome,
) -> String {
    let output = &outcome.output;
    let items = input.highlight_map.len();
    let mut text = match summary.intent {
        IntentKind::Reorder | IntentKind::Group if output.section_count > 0 => format!(
            "Reordered {} items into {} sections with {} changes.",
            items,
            output.section_count,
            output.changes.len()
        ),
        IntentKind::Reorder | IntentKind::Group => format!(
            "Reordered {} items with {} changes.",
            items,
            output.changes.len()
        ),
        IntentKind::Analyze => format!(
            "Analyzed {} items; the order is unchanged. {} suggestions.",
            items,
            output.changes.len()
        ),
    };
    if !output.changes.is_empty() {
        text.push('\n');
        text.push_str(&bullet_list(&output.changes));
    }
    text
}
