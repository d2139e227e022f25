use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn health(State(_state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "initialized": true
    }))
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let pipeline = &state.pipeline;
    let corpus = pipeline.corpus();
    let ollama_reachable = state.ollama.health_check().await;

    Ok(Json(json!({
        "initialized": true,
        "corpus": {
            "path": state.corpus_path.to_string_lossy(),
            "size": corpus.size(),
            "dimension": corpus.dimension(),
            "embedding_model": corpus.embedding_model(),
        },
        "embedding": {
            "backend": pipeline.embedder_name(),
            "model": state.settings.embedding.model,
        },
        "generation": {
            "backend": pipeline.generator_name(),
            "model": pipeline.generate_options().model,
            "max_retries": pipeline.generate_options().max_retries,
            "timeout_secs": pipeline.generate_options().timeout.as_secs(),
        },
        "retrieval": {
            "top_k": pipeline.top_k(),
            "min_relevance": state.settings.retrieval.min_relevance,
        },
        "guardrails": {
            "confusable_pairs": state.settings.guardrails.confusable_pairs.len(),
            "entity_titles": state.settings.guardrails.entity_titles.len(),
        },
        "ollama_reachable": ollama_reachable,
    })))
}
