use async_trait::async_trait;

use super::types::GenerateOptions;
use crate::core::errors::{EmbeddingError, GenerationError};

/// Maps text to a fixed-dimension vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// return the backend name (e.g. "ollama")
    fn name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Produces free text for a prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    /// return the backend name (e.g. "ollama")
    fn name(&self) -> &str;

    /// One attempt. Retries and the overall deadline are the caller's concern.
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, GenerationError>;
}
