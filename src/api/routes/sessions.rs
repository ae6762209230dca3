use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::api::{error::ApiError, state::AppState};
use crate::domain::Turn;

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub turns: Vec<Turn>,
}

pub async fn get_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let turns = state.ask.memory().load(&session_id).await;
    if turns.is_empty() {
        return Err(ApiError::NotFound(format!("no history for session {session_id}")));
    }

    Ok(Json(HistoryResponse { session_id, turns }))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> StatusCode {
    if state.ask.memory().clear(&session_id).await {
        tracing::info!(session_id = %session_id, "session cleared");
    }
    StatusCode::NO_CONTENT
}
