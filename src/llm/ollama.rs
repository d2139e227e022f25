use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};

use super::provider::{Embedder, Generator};
use super::types::{GenerateOptions, ProviderModel};
use crate::core::config::RagSettings;
use crate::core::errors::{ApiError, EmbeddingError, GenerationError};

/// Embedder and Generator backed by a local Ollama server.
#[derive(Clone)]
pub struct OllamaProvider {
    base_url: String,
    client: Client,
    api_key: Option<String>,
    embedding_model: String,
    embedding_timeout: Duration,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>, embedding_model: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
            api_key: None,
            embedding_model: embedding_model.into(),
            embedding_timeout: Duration::from_secs(30),
        }
    }

    pub fn from_settings(settings: &RagSettings) -> Self {
        Self::new(
            settings.ollama.base_url.clone(),
            settings.embedding.model.clone(),
        )
        .with_api_key(settings.ollama.api_key.clone())
        .with_embedding_timeout(settings.embedding.timeout)
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_embedding_timeout(mut self, timeout: Duration) -> Self {
        self.embedding_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// check if the server is reachable
    pub async fn health_check(&self) -> bool {
        self.list_models().await.is_ok()
    }

    /// list models pulled into the server
    pub async fn list_models(&self) -> Result<Vec<ProviderModel>, ApiError> {
        let url = format!("{}/api/tags", self.base_url);
        let res = self
            .request(self.client.get(&url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            return Err(ApiError::Internal(format!(
                "Failed to list models: {}",
                res.status()
            )));
        }

        let response: TagsResponse = res.json().await.map_err(ApiError::internal)?;
        Ok(response.models)
    }
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ProviderModel>,
}

#[async_trait]
impl Embedder for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/api/embed", self.base_url);
        let body = json!({
            "model": self.embedding_model,
            "input": [text],
        });

        let res = self
            .request(self.client.post(&url))
            .timeout(self.embedding_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|err| EmbeddingError::Unreachable(err.to_string()))?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(EmbeddingError::Status { status, body });
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|err| EmbeddingError::Malformed(err.to_string()))?;
        parse_embedding(&payload)
    }
}

fn parse_embedding(payload: &Value) -> Result<Vec<f32>, EmbeddingError> {
    let values = payload
        .get("embeddings")
        .and_then(|v| v.as_array())
        .and_then(|list| list.first())
        .and_then(|v| v.as_array())
        .ok_or_else(|| EmbeddingError::Malformed("missing 'embeddings' field".to_string()))?;

    let vector = values
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect::<Option<Vec<f32>>>()
        .ok_or_else(|| EmbeddingError::Malformed("non-numeric embedding value".to_string()))?;

    if vector.is_empty() {
        return Err(EmbeddingError::Malformed("empty embedding".to_string()));
    }
    Ok(vector)
}

#[async_trait]
impl Generator for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, GenerationError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = json!({
            "model": options.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "num_predict": options.num_predict,
                "temperature": options.temperature,
            },
        });

        let res = self
            .request(self.client.post(&url))
            .timeout(options.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    GenerationError::Timeout(options.timeout)
                } else {
                    GenerationError::Unreachable(err.to_string())
                }
            })?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(GenerationError::Status { status, body });
        }

        let payload: Value = res.json().await.map_err(|err| {
            if err.is_timeout() {
                GenerationError::Timeout(options.timeout)
            } else {
                GenerationError::Malformed(err.to_string())
            }
        })?;
        tracing::debug!("Ollama raw response: {}", payload);

        payload
            .get("response")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| GenerationError::Malformed("missing 'response' field".to_string()))
    }
}
