use axum::{extract::rejection::JsonRejection, extract::State, response::Html, Json};
use serde::{Deserialize, Serialize};

use crate::api::{error::ApiError, state::AppState};
use crate::application::DEFAULT_SESSION;

const INDEX_HTML: &str = include_str!("../../../static/index.html");

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub answer: String,
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn ask_handler(
    State(state): State<AppState>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, ApiError> {
    let Json(request) = payload?;

    let question = request
        .question
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing 'question' in JSON payload".to_string()))?;

    let session_id = match request.session_id {
        Some(id) if id.trim().is_empty() => {
            return Err(ApiError::BadRequest("'session_id' must not be empty".to_string()))
        }
        Some(id) => id,
        None => DEFAULT_SESSION.to_string(),
    };

    tracing::info!(session_id = %session_id, "question received");
    let answer = state.ask.ask(&session_id, &question).await?;

    Ok(Json(AskResponse { answer }))
}
