use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::core::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub question: String,
}

pub async fn answer(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AnswerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state.pipeline.answer(&payload.question).await.map_err(|err| {
        tracing::warn!(stage = ?err.stage(), "Answer request failed: {}", err);
        ApiError::from(err)
    })?;
    Ok(Json(result))
}
