// tests/common/mod.rs
// Shared fixtures: in-memory engine, scripted completion client, flaky store

#![allow(dead_code)]

use async_trait::async_trait;
use montage::config::EngineConfig;
use montage::db::memory_pool;
use montage::error::{MontageError, Result};
use montage::functions::{ContextDataSource, FunctionRegistry};
use montage::intent::TemplateCatalog;
use montage::llm::{Completion, CompletionClient, CompletionRequest};
use montage::orchestrator::{EngineParts, FlowOrchestrator, SqliteChangeApplier};
use montage::session::{Message, MessageRole, NewMessage, Session, SessionStore, SqliteSessionStore};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Scripted completion client
// ============================================================================

/// Replays canned completions in order and records every request it receives
#[derive(Default)]
pub struct ScriptedClient {
    responses: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    delay: Option<Duration>,
}

impl ScriptedClient {
    pub fn new(responses: Vec<Result<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(t.to_string())).collect())
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(MontageError::llm("script exhausted", false)));
        next.map(|text| Completion {
            text,
            tokens_used: 10,
            model,
            duration_ms: 1,
        })
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }
}

// ============================================================================
// Store that can refuse reply writes or session lookups
// ============================================================================

/// Wraps the SQLite store. `fail_replies` makes non-user appends fail,
/// `fail_sessions` makes session resolution fail.
pub struct FlakyStore {
    inner: SqliteSessionStore,
    pub fail_replies: AtomicBool,
    pub fail_sessions: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: SqliteSessionStore) -> Self {
        Self {
            inner,
            fail_replies: AtomicBool::new(false),
            fail_sessions: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl SessionStore for FlakyStore {
    async fn find_or_create_session(&self, project_id: &str, topic_id: &str) -> Result<Session> {
        if self.fail_sessions.load(Ordering::SeqCst) {
            return Err(MontageError::persistence("database is locked"));
        }
        self.inner.find_or_create_session(project_id, topic_id).await
    }

    async fn get_session(&self, project_id: &str, topic_id: &str) -> Result<Option<Session>> {
        self.inner.get_session(project_id, topic_id).await
    }

    async fn append_message(&self, session_id: &str, message: NewMessage) -> Result<Message> {
        if message.role != MessageRole::User && self.fail_replies.load(Ordering::SeqCst) {
            return Err(MontageError::persistence("disk is full"));
        }
        self.inner.append_message(session_id, message).await
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        self.inner.list_messages(session_id).await
    }

    async fn set_selected_model(&self, session_id: &str, model: &str) -> Result<()> {
        self.inner.set_selected_model(session_id, model).await
    }

    async fn clear_session(&self, project_id: &str, topic_id: &str) -> Result<u64> {
        self.inner.clear_session(project_id, topic_id).await
    }
}

// ============================================================================
// Engine construction
// ============================================================================

pub struct TestEngine {
    pub orchestrator: Arc<FlowOrchestrator>,
    pub client: Arc<ScriptedClient>,
    pub store: Arc<dyn SessionStore>,
    pub applier: Arc<SqliteChangeApplier>,
}

pub async fn engine(client: ScriptedClient) -> TestEngine {
    engine_with(client, EngineConfig::default()).await
}

pub async fn engine_with(client: ScriptedClient, config: EngineConfig) -> TestEngine {
    let pool = memory_pool().await.unwrap();
    let store: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::new(pool.clone()));
    engine_from_parts(client, store, pool, config)
}

pub fn engine_from_parts(
    client: ScriptedClient,
    store: Arc<dyn SessionStore>,
    pool: sqlx::SqlitePool,
    config: EngineConfig,
) -> TestEngine {
    let client = Arc::new(client);
    let applier = Arc::new(SqliteChangeApplier::new(pool));
    let parts = EngineParts {
        client: client.clone(),
        store: store.clone(),
        registry: Arc::new(FunctionRegistry::with_data_source(Arc::new(ContextDataSource))),
        catalog: Arc::new(TemplateCatalog::builtin()),
        applier: applier.clone(),
    };
    TestEngine {
        orchestrator: Arc::new(FlowOrchestrator::new(parts, &config)),
        client,
        store,
        applier,
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Five highlights h1..h5 in their current order
pub fn five_items() -> Value {
    json!({
        "items": [
            {"id": "h1", "text": "Hi everyone, welcome back to the channel"},
            {"id": "h2", "text": "Today we are testing the new drone"},
            {"id": "h3", "text": "Unboxing and first impressions"},
            {"id": "h4", "text": "The drone crashes into the lake"},
            {"id": "h5", "text": "Thanks for watching, see you next time"}
        ],
        "order": ["h1", "h2", "h3", "h4", "h5"]
    })
}

pub fn confirmed_intent(intent: &str) -> String {
    json!({
        "intent": intent,
        "useCurrentOrder": true,
        "goals": ["stronger opening"],
        "specificRequests": ["keep the sign-off last"],
        "userContext": "travel vlog",
        "confirmed": true
    })
    .to_string()
}

/// Reorder of h1..h5 with two section markers and two changes
pub fn reorder_output() -> String {
    json!({
        "success": true,
        "newOrder": [
            "h4",
            {"section": "Setup"},
            "h1", "h2", "h3",
            {"section": "Wrap-up"},
            "h5"
        ],
        "reasoning": "Opening on the crash hooks viewers immediately.",
        "sectionCount": 2,
        "changes": ["Moved the crash to the opening", "Added Setup and Wrap-up sections"],
        "error": null
    })
    .to_string()
}
