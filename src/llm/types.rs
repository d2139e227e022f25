use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-call generation options forwarded to a `Generator`.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateOptions {
    /// Backing model to invoke.
    pub model: String,
    /// Maximum wait for a single attempt.
    pub timeout: Duration,
    /// 0 or 1; the pipeline repeats a failed call at most this many times.
    pub max_retries: u32,
    pub temperature: f32,
    /// Upper bound on generated tokens.
    pub num_predict: u32,
}

impl GenerateOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            timeout: Duration::from_secs(170),
            max_retries: 1,
            temperature: 0.0,
            num_predict: 400,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.min(1);
        self
    }
}

/// Entry of Ollama's `/api/tags` listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderModel {
    pub name: String,
    #[serde(default)]
    pub size: u64,
}
