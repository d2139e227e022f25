use thiserror::Error;

use crate::core::errors::{ApiError, CorpusLoadError};

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Failed to load configuration: {0}")]
    Config(#[source] ApiError),

    #[error("Failed to load corpus: {0}")]
    Corpus(#[from] CorpusLoadError),
}
