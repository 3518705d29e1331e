use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::api::middleware::AppError;
use crate::config::Config;
use crate::models::{TurnHistoryQuery, TurnOutcome, TurnRequest};
use crate::services::database::DatabaseAdapter;
use crate::services::{ConnectionPoolManager, SessionManager};

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub adapter: Arc<dyn DatabaseAdapter>,
    pub pool_manager: Arc<ConnectionPoolManager>,
    pub config: Config,
}

/// Start a new conversation
pub async fn create_session(
    State(state): State<AppState>,
) -> (StatusCode, Json<serde_json::Value>) {
    let session = state.sessions.create_session().await;
    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "session": session
        })),
    )
}

pub async fn list_sessions(State(state): State<AppState>) -> Json<serde_json::Value> {
    let sessions = state.sessions.list_sessions().await;
    Json(serde_json::json!({
        "sessions": sessions
    }))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.sessions.delete_session(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Ask a question in the context of the session's previous turns
pub async fn create_turn(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<TurnRequest>,
) -> Result<Json<TurnOutcome>, AppError> {
    tracing::info!("New turn for session {}", id);
    let outcome = state.sessions.handle_turn(&id, &payload.question).await?;
    Ok(Json(outcome))
}

/// Recorded turns, newest first
pub async fn list_turns(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<TurnHistoryQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let turns = state.sessions.turns(&id, params.limit).await?;
    Ok(Json(serde_json::json!({
        "turns": turns
    })))
}

/// Conversation entries replayed to the model on the next turn
pub async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let entries = state.sessions.history(&id).await?;
    Ok(Json(serde_json::json!({
        "history": entries
    })))
}

pub async fn clear_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.sessions.clear_history(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
