// src/lib.rs
// Montage - conversational task orchestration for project content edits

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod functions;
pub mod intent;
pub mod llm;
pub mod orchestrator;
pub mod pipeline;
pub mod server;
pub mod session;

pub use config::EngineConfig;
pub use error::{MontageError, Result};
pub use orchestrator::{ChatRequest, ChatResponse, EngineParts, FlowOrchestrator};

use std::sync::Arc;

use functions::{ContextDataSource, FunctionRegistry};
use intent::TemplateCatalog;
use llm::OpenAiCompatClient;
use orchestrator::SqliteChangeApplier;
use session::SqliteSessionStore;

/// Wire the production engine: SQLite store and applier, OpenAI-compatible
/// client, built-in catalog, and functions reading the request's `contextData`.
pub fn build_engine(config: &EngineConfig, pool: sqlx::SqlitePool) -> FlowOrchestrator {
    let parts = EngineParts {
        client: Arc::new(OpenAiCompatClient::new(&config.completion)),
        store: Arc::new(SqliteSessionStore::new(pool.clone())),
        registry: Arc::new(FunctionRegistry::with_data_source(Arc::new(ContextDataSource))),
        catalog: Arc::new(TemplateCatalog::builtin()),
        applier: Arc::new(SqliteChangeApplier::new(pool)),
    };
    FlowOrchestrator::new(parts, config)
}
