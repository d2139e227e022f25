//! Typed view over the validated YAML config.
//!
//! `ConfigService` yields a `serde_json::Value`; this module projects it into
//! the settings the pipeline and the HTTP shell consume, applying defaults for
//! every key that is absent.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::core::errors::ApiError;
use crate::llm::GenerateOptions;
use crate::rag::{ConfusablePair, EntityTitle};

pub const DEFAULT_INSUFFICIENT_MESSAGE: &str =
    "I do not have enough information in the provided sources to answer that question.";

pub const DEFAULT_PERSONA: &str =
    "You are a careful assistant answering questions about the Mothers of the Believers (Azwaj), the wives of the Prophet. Accuracy matters more than completeness.";

#[derive(Debug, Clone)]
pub struct CorpusSettings {
    pub snapshot_path: PathBuf,
    pub expected_dimension: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct OllamaSettings {
    pub base_url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    pub model: String,
    pub timeout: Duration,
    pub verify_on_startup: bool,
}

#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub model: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub temperature: f32,
    pub num_predict: u32,
}

impl GenerationSettings {
    pub fn options(&self) -> GenerateOptions {
        GenerateOptions {
            model: self.model.clone(),
            timeout: self.timeout,
            max_retries: self.max_retries,
            temperature: self.temperature,
            num_predict: self.num_predict,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub min_relevance: f32,
}

#[derive(Debug, Clone)]
pub struct GuardrailSettings {
    pub persona: String,
    pub insufficient_message: String,
    pub confusable_pairs: Vec<ConfusablePair>,
    pub entity_titles: Vec<EntityTitle>,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub max_question_length: usize,
}

#[derive(Debug, Clone)]
pub struct RagSettings {
    pub corpus: CorpusSettings,
    pub ollama: OllamaSettings,
    pub embedding: EmbeddingSettings,
    pub generation: GenerationSettings,
    pub retrieval: RetrievalSettings,
    pub guardrails: GuardrailSettings,
    pub server: ServerSettings,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            corpus: CorpusSettings {
                snapshot_path: PathBuf::from("data/azwaj_chunks.json"),
                expected_dimension: None,
            },
            ollama: OllamaSettings {
                base_url: "http://localhost:11434".to_string(),
                api_key: None,
            },
            embedding: EmbeddingSettings {
                model: "bge-m3".to_string(),
                timeout: Duration::from_secs(30),
                verify_on_startup: true,
            },
            generation: GenerationSettings {
                model: "llama3.2".to_string(),
                timeout: Duration::from_secs(170),
                max_retries: 1,
                temperature: 0.0,
                num_predict: 400,
            },
            retrieval: RetrievalSettings {
                top_k: 3,
                min_relevance: 0.35,
            },
            guardrails: GuardrailSettings {
                persona: DEFAULT_PERSONA.to_string(),
                insufficient_message: DEFAULT_INSUFFICIENT_MESSAGE.to_string(),
                confusable_pairs: Vec::new(),
                entity_titles: Vec::new(),
            },
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 0,
                allowed_origins: Vec::new(),
                max_question_length: 2000,
            },
        }
    }
}

impl RagSettings {
    /// Builds settings from a config value already checked by `validate_config`.
    pub fn from_config(config: &Value) -> Result<Self, ApiError> {
        let defaults = Self::default();

        let corpus = CorpusSettings {
            snapshot_path: string_at(config, "corpus", "snapshot_path")
                .map(PathBuf::from)
                .unwrap_or(defaults.corpus.snapshot_path),
            expected_dimension: u64_at(config, "corpus", "expected_dimension").map(|v| v as usize),
        };

        let ollama = OllamaSettings {
            base_url: string_at(config, "ollama", "base_url").unwrap_or(defaults.ollama.base_url),
            api_key: string_at(config, "ollama", "api_key").filter(|key| !key.trim().is_empty()),
        };

        let embedding = EmbeddingSettings {
            model: string_at(config, "embedding", "model").unwrap_or(defaults.embedding.model),
            timeout: u64_at(config, "embedding", "timeout_secs")
                .map(Duration::from_secs)
                .unwrap_or(defaults.embedding.timeout),
            verify_on_startup: config
                .get("embedding")
                .and_then(|v| v.get("verify_on_startup"))
                .and_then(|v| v.as_bool())
                .unwrap_or(defaults.embedding.verify_on_startup),
        };

        let generation = GenerationSettings {
            model: string_at(config, "generation", "model").unwrap_or(defaults.generation.model),
            timeout: u64_at(config, "generation", "timeout_secs")
                .map(Duration::from_secs)
                .unwrap_or(defaults.generation.timeout),
            max_retries: u64_at(config, "generation", "max_retries")
                .map(|v| v.min(1) as u32)
                .unwrap_or(defaults.generation.max_retries),
            temperature: f64_at(config, "generation", "temperature")
                .map(|v| v as f32)
                .unwrap_or(defaults.generation.temperature),
            num_predict: u64_at(config, "generation", "num_predict")
                .map(|v| v as u32)
                .unwrap_or(defaults.generation.num_predict),
        };

        let retrieval = RetrievalSettings {
            top_k: u64_at(config, "retrieval", "top_k")
                .map(|v| v.max(1) as usize)
                .unwrap_or(defaults.retrieval.top_k),
            min_relevance: f64_at(config, "retrieval", "min_relevance")
                .map(|v| v.clamp(-1.0, 1.0) as f32)
                .unwrap_or(defaults.retrieval.min_relevance),
        };

        let guardrails = GuardrailSettings {
            persona: string_at(config, "guardrails", "persona")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.guardrails.persona),
            insufficient_message: string_at(config, "guardrails", "insufficient_message")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.guardrails.insufficient_message),
            confusable_pairs: list_at(config, "guardrails", "confusable_pairs")?,
            entity_titles: list_at(config, "guardrails", "entity_titles")?,
        };

        let server = ServerSettings {
            host: string_at(config, "server", "host").unwrap_or(defaults.server.host),
            port: u64_at(config, "server", "port")
                .map(|v| v as u16)
                .unwrap_or(defaults.server.port),
            allowed_origins: config
                .get("server")
                .and_then(|v| v.get("allowed_origins"))
                .and_then(|v| v.as_array())
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| item.as_str())
                        .map(|item| item.trim().to_string())
                        .filter(|item| !item.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            max_question_length: u64_at(config, "server", "max_question_length")
                .map(|v| v as usize)
                .unwrap_or(defaults.server.max_question_length),
        };

        Ok(Self {
            corpus,
            ollama,
            embedding,
            generation,
            retrieval,
            guardrails,
            server,
        })
    }
}

fn string_at(config: &Value, section: &str, key: &str) -> Option<String> {
    config
        .get(section)
        .and_then(|v| v.get(key))
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
}

fn u64_at(config: &Value, section: &str, key: &str) -> Option<u64> {
    config
        .get(section)
        .and_then(|v| v.get(key))
        .and_then(|v| v.as_u64())
}

fn f64_at(config: &Value, section: &str, key: &str) -> Option<f64> {
    config
        .get(section)
        .and_then(|v| v.get(key))
        .and_then(|v| v.as_f64())
}

fn list_at<T: for<'de> Deserialize<'de>>(
    config: &Value,
    section: &str,
    key: &str,
) -> Result<Vec<T>, ApiError> {
    match config.get(section).and_then(|v| v.get(key)) {
        Some(value) => serde_json::from_value(value.clone()).map_err(|err| {
            ApiError::BadRequest(format!("Invalid config at '{}.{}': {}", section, key, err))
        }),
        None => Ok(Vec::new()),
    }
}
