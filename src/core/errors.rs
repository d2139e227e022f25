use std::path::PathBuf;
use std::time::Duration;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

use crate::rag::PipelineStage;

/// Fatal at startup: the process must not serve with a partial corpus.
#[derive(Debug, Error)]
pub enum CorpusLoadError {
    #[error("corpus snapshot not found: {0}")]
    Missing(PathBuf),
    #[error("failed to read corpus snapshot {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corpus snapshot {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("corpus snapshot contains no records")]
    Empty,
    #[error("record {index} has an empty embedding")]
    EmptyEmbedding { index: usize },
    #[error("record {index} has embedding dimension {found}, expected {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },
    #[error("snapshot declares dimension {declared} but records have dimension {found}")]
    DeclaredDimensionMismatch { declared: usize, found: usize },
    #[error("record {index} has a non-finite embedding value")]
    NonFiniteEmbedding { index: usize },
    #[error("corpus dimension {corpus} does not match embedder dimension {embedder}")]
    EmbedderMismatch { corpus: usize, embedder: usize },
    #[error("embedder probe failed: {0}")]
    EmbedderProbe(#[source] EmbeddingError),
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedder unreachable: {0}")]
    Unreachable(String),
    #[error("embedder returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed embedding response: {0}")]
    Malformed(String),
    #[error("query embedding has dimension {found}, corpus expects {expected}")]
    DimensionMismatch { expected: usize, found: usize },
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generator unreachable: {0}")]
    Unreachable(String),
    #[error("generator timed out after {0:?}")]
    Timeout(Duration),
    #[error("generator returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed generation response: {0}")]
    Malformed(String),
}

/// Per-request failure of `AnswerPipeline::answer`.
#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("question is empty")]
    EmptyQuestion,
    #[error("question is {length} characters, limit is {limit}")]
    QuestionTooLong { length: usize, limit: usize },
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("generation failed after {attempts} attempt(s): {source}")]
    Generation {
        attempts: u32,
        #[source]
        source: GenerationError,
    },
}

impl AnswerError {
    /// Stage the request was in when it failed.
    pub fn stage(&self) -> PipelineStage {
        match self {
            AnswerError::EmptyQuestion | AnswerError::QuestionTooLong { .. } => PipelineStage::Idle,
            AnswerError::Embedding(_) => PipelineStage::Embedding,
            AnswerError::Generation { .. } => PipelineStage::Generating,
        }
    }

    /// Short machine-readable label used by the HTTP shell.
    pub fn kind(&self) -> &'static str {
        match self {
            AnswerError::EmptyQuestion | AnswerError::QuestionTooLong { .. } => "invalid_question",
            AnswerError::Embedding(_) => "embedding",
            AnswerError::Generation { .. } => "generation",
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("upstream {kind} failure: {message}")]
    BadGateway { kind: &'static str, message: String },
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<AnswerError> for ApiError {
    fn from(err: AnswerError) -> Self {
        match err {
            AnswerError::EmptyQuestion | AnswerError::QuestionTooLong { .. } => {
                ApiError::BadRequest(err.to_string())
            }
            AnswerError::Embedding(_) | AnswerError::Generation { .. } => ApiError::BadGateway {
                kind: err.kind(),
                message: err.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::BadGateway { kind, message } => (
                StatusCode::BAD_GATEWAY,
                json!({ "error": message, "kind": kind }),
            ),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg })),
        };

        (status, Json(body)).into_response()
    }
}
