use std::path::PathBuf;
use std::sync::Arc;

use crate::core::config::{AppPaths, ConfigService, RagSettings};
use crate::corpus::Corpus;
use crate::llm::{Embedder, Generator, OllamaProvider};
use crate::rag::AnswerPipeline;

pub mod error;

use error::InitializationError;

/// Shared state handed to every route.
///
/// Everything here is read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub settings: Arc<RagSettings>,
    pub corpus_path: PathBuf,
    pub ollama: OllamaProvider,
    pub pipeline: Arc<AnswerPipeline>,
}

impl AppState {
    /// Loads config and corpus, then wires the pipeline to Ollama.
    ///
    /// Any corpus problem is fatal: the server never starts with a partial
    /// or dimensionally inconsistent corpus.
    pub async fn initialize(paths: Arc<AppPaths>) -> Result<Arc<Self>, InitializationError> {
        let config = ConfigService::new(paths.clone());
        let raw = config.load_config().map_err(InitializationError::Config)?;
        tracing::info!(
            "Loaded config from {}: {}",
            config.config_path().display(),
            config.redact_sensitive_values(&raw)
        );
        let settings = RagSettings::from_config(&raw).map_err(InitializationError::Config)?;

        let corpus_path = paths.resolve(&settings.corpus.snapshot_path);
        let corpus = Arc::new(Corpus::load_with_expected_dimension(
            &corpus_path,
            settings.corpus.expected_dimension,
        )?);
        if let Some(model) = corpus.embedding_model() {
            if model != settings.embedding.model {
                tracing::warn!(
                    "Corpus was embedded with '{}' but queries use '{}'",
                    model,
                    settings.embedding.model
                );
            }
        }

        let ollama = OllamaProvider::from_settings(&settings);
        let embedder: Arc<dyn Embedder> = Arc::new(ollama.clone());
        let generator: Arc<dyn Generator> = Arc::new(ollama.clone());

        let state = Self::from_parts(
            paths, config, settings, corpus_path, corpus, ollama, embedder, generator,
        );

        if state.settings.embedding.verify_on_startup {
            state.pipeline.verify_embedder().await?;
        }

        Ok(Arc::new(state))
    }

    /// Assembles state from already-loaded parts.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        paths: Arc<AppPaths>,
        config: ConfigService,
        settings: RagSettings,
        corpus_path: PathBuf,
        corpus: Arc<Corpus>,
        ollama: OllamaProvider,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        let pipeline = Arc::new(AnswerPipeline::new(corpus, embedder, generator, &settings));
        Self {
            paths,
            config,
            settings: Arc::new(settings),
            corpus_path,
            ollama,
            pipeline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_fixture(root: &std::path::Path, config: &str) {
        fs::write(root.join("config.yml"), config).unwrap();
        fs::create_dir_all(root.join("data")).unwrap();
        fs::write(
            root.join("data/chunks.json"),
            r#"[{"content": "Umm Habibah was the daughter of Abu Sufyan.", "wife_name": "Umm Habibah", "chunk_embeddings": [1.0, 0.0]}]"#,
        )
        .unwrap();
    }

    #[tokio::test]
    async fn initialize_loads_corpus_without_probe() {
        let root = tempfile::tempdir().unwrap();
        write_fixture(
            root.path(),
            "corpus:\n  snapshot_path: data/chunks.json\nembedding:\n  verify_on_startup: false\n",
        );
        let paths = Arc::new(AppPaths::from_dirs(
            root.path().to_path_buf(),
            root.path().join("user"),
        ));

        let state = AppState::initialize(paths).await.unwrap();

        assert_eq!(state.pipeline.corpus().size(), 1);
        assert_eq!(state.pipeline.corpus().dimension(), 2);
        assert_eq!(state.corpus_path, root.path().join("data/chunks.json"));
    }

    #[tokio::test]
    async fn missing_corpus_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        fs::write(
            root.path().join("config.yml"),
            "corpus:\n  snapshot_path: data/absent.json\nembedding:\n  verify_on_startup: false\n",
        )
        .unwrap();
        let paths = Arc::new(AppPaths::from_dirs(
            root.path().to_path_buf(),
            root.path().join("user"),
        ));

        let err = AppState::initialize(paths).await.err().unwrap();

        assert!(matches!(
            err,
            InitializationError::Corpus(crate::core::errors::CorpusLoadError::Missing(_))
        ));
    }

    #[tokio::test]
    async fn expected_dimension_mismatch_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        write_fixture(
            root.path(),
            "corpus:\n  snapshot_path: data/chunks.json\n  expected_dimension: 1024\nembedding:\n  verify_on_startup: false\n",
        );
        let paths = Arc::new(AppPaths::from_dirs(
            root.path().to_path_buf(),
            root.path().join("user"),
        ));

        let err = AppState::initialize(paths).await.err().unwrap();

        assert!(matches!(
            err,
            InitializationError::Corpus(crate::core::errors::CorpusLoadError::EmbedderMismatch { .. })
        ));
    }
}
