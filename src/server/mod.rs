//! HTTP surface over the flow orchestrator
//!
//! Handlers stay thin: same-session serialization lives in the orchestrator.

mod handlers;

use anyhow::Result;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    routing::get,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::{
    cors::{Any, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::info;

use crate::orchestrator::FlowOrchestrator;

/// API version reported in the `x-api-version` header and `/api/status`
pub const API_VERSION: &str = "1";

/// Max request body size for chat requests (contextData can carry many items)
const CHAT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<FlowOrchestrator>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(orchestrator: Arc<FlowOrchestrator>) -> Self {
        Self {
            orchestrator,
            started_at: Instant::now(),
        }
    }
}

// ============================================================================
// Routes
// ============================================================================

/// Create the router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    // API version header on all responses
    let version_header = SetResponseHeaderLayer::if_not_present(
        header::HeaderName::from_static("x-api-version"),
        HeaderValue::from_static(API_VERSION),
    );

    Router::new()
        .route("/api/status", get(handlers::status_handler))
        .route(
            "/api/chat",
            axum::routing::post(handlers::chat_handler)
                .layer(DefaultBodyLimit::max(CHAT_MAX_BODY_BYTES)),
        )
        .route(
            "/api/chat/history",
            get(handlers::history_handler).delete(handlers::clear_handler),
        )
        .layer(version_header)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server until the process is stopped
pub async fn run(host: &str, port: u16, state: AppState) -> Result<()> {
    let app = create_router(state);
    let addr = format!("{}:{}", host, port);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "Server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
