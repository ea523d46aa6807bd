//! HTTP handlers for chat turns, history and status

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{API_VERSION, AppState};
use crate::error::MontageError;
use crate::orchestrator::{ChatRequest, ChatResponse, ClearResponse, HistoryResponse};

/// Maps engine errors onto HTTP status codes with a JSON body
pub struct ApiError(MontageError);

impl From<MontageError> for ApiError {
    fn from(err: MontageError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            MontageError::Validation(_) => StatusCode::BAD_REQUEST,
            MontageError::Cancelled => StatusCode::REQUEST_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(kind = self.0.kind(), error = %self.0, "Request failed");
        }
        let body = json!({
            "success": false,
            "error": self.0.to_user_string(),
            "kind": self.0.kind(),
        });
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub project_id: String,
    pub topic_id: String,
}

/// Health check and status endpoint
pub async fn status_handler(State(state): State<AppState>) -> Json<Value> {
    let orchestrator = &state.orchestrator;
    Json(json!({
        "status": "ok",
        "apiVersion": API_VERSION,
        "version": env!("CARGO_PKG_VERSION"),
        "defaultModel": orchestrator.default_model(),
        "intents": orchestrator.intents(),
        "uptimeSecs": state.started_at.elapsed().as_secs(),
    }))
}

/// Run one chat turn. Stage failures still return 200 with `success: false`.
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let response = state.orchestrator.handle_turn(request).await?;
    Ok(Json(response))
}

pub async fn history_handler(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let history = state
        .orchestrator
        .history(&query.project_id, &query.topic_id)
        .await?;
    Ok(Json(history))
}

pub async fn clear_handler(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ClearResponse>, ApiError> {
    let cleared = state
        .orchestrator
        .clear(&query.project_id, &query.topic_id)
        .await?;
    Ok(Json(cleared))
}
