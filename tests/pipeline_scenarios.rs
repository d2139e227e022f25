use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;

use azwaj_rag::core::config::{AppPaths, ConfigService, RagSettings};
use azwaj_rag::core::errors::{AnswerError, EmbeddingError, GenerationError};
use azwaj_rag::corpus::Corpus;
use azwaj_rag::llm::{Embedder, GenerateOptions, Generator};
use azwaj_rag::rag::{AnswerPipeline, PipelineStage, QueryContext};

fn manifest_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

fn fixture_corpus() -> Arc<Corpus> {
    Arc::new(Corpus::load(&manifest_dir().join("tests/fixtures/azwaj_chunks.json")).unwrap())
}

/// Settings from the shipped `config.yml`, with a short generator deadline.
fn shipped_settings() -> RagSettings {
    let data_dir = tempfile::tempdir().unwrap();
    let paths = Arc::new(AppPaths::from_dirs(manifest_dir(), data_dir.path().to_path_buf()));
    let config = ConfigService::new(paths).load_config().unwrap();
    let mut settings = RagSettings::from_config(&config).unwrap();
    settings.generation.timeout = Duration::from_millis(150);
    settings
}

/// Three axes: Umm Habibah, Zaynab bint Jahsh, Zaynab bint Khuzaymah.
struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let text = text.to_lowercase();
        let mut vector = vec![0.0f32; 3];
        if text.contains("habibah") || text.contains("ramlah") {
            vector[0] += 1.0;
        }
        if text.contains("jahsh") {
            vector[1] += 1.0;
        }
        if text.contains("khuzaymah") || text.contains("needy") {
            vector[2] += 1.0;
        }
        if text.contains("zaynab") && !text.contains("jahsh") && !text.contains("khuzaymah") {
            vector[1] += 0.5;
            vector[2] += 0.5;
        }
        Ok(vector)
    }
}

/// Replies with the first context passage, or makes something up when there
/// is none.
struct PassageEchoGenerator {
    prompts: Mutex<Vec<String>>,
}

impl PassageEchoGenerator {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Generator for PassageEchoGenerator {
    fn name(&self) -> &str {
        "passage-echo"
    }

    async fn generate(
        &self,
        prompt: &str,
        _options: &GenerateOptions,
    ) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let mut lines = prompt.lines();
        while let Some(line) = lines.next() {
            if line.starts_with("[1] (") {
                return Ok(lines.next().unwrap_or_default().to_string());
            }
        }
        Ok("Cleopatra was the last active ruler of the Ptolemaic Kingdom.".to_string())
    }
}

enum Step {
    Reply(&'static str),
    Fail,
    Hang,
}

struct ScriptedGenerator {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        _prompt: &str,
        _options: &GenerateOptions,
    ) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Reply(text)) => Ok(text.to_string()),
            Some(Step::Fail) | None => Err(GenerationError::Status {
                status: 500,
                body: "model crashed".to_string(),
            }),
            Some(Step::Hang) => {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Ok("too late".to_string())
            }
        }
    }
}

fn pipeline_with(generator: Arc<dyn Generator>) -> AnswerPipeline {
    AnswerPipeline::new(
        fixture_corpus(),
        Arc::new(KeywordEmbedder),
        generator,
        &shipped_settings(),
    )
}

#[tokio::test]
async fn lineage_question_stays_on_the_asked_entity() {
    let generator = PassageEchoGenerator::new();
    let pipeline = pipeline_with(generator.clone());

    let ctx = pipeline
        .retrieve("What was the lineage of Umm Habibah?")
        .await
        .unwrap();
    assert_eq!(ctx.ranked_passages[0].record.id, "umm-habibah-lineage");

    let result = pipeline
        .answer("What was the lineage of Umm Habibah?")
        .await
        .unwrap();

    assert!(!result.insufficient);
    assert!(result.text.contains("Abu Sufyan"));
    assert!(!result.text.contains("Jahsh"));
    assert!(result.sources.iter().all(|s| s.id == "umm-habibah-lineage"));
    assert!(!generator.last_prompt().contains("Zaynab bint Jahsh was the daughter"));
}

#[tokio::test]
async fn unrelated_question_is_insufficient() {
    let generator = PassageEchoGenerator::new();
    let pipeline = pipeline_with(generator.clone());

    let result = pipeline.answer("Who was Cleopatra?").await.unwrap();

    assert!(result.insufficient);
    assert!(!result.text.contains("Cleopatra"));
    assert!(result.sources.is_empty());
    assert!(generator.last_prompt().contains("NO CONTEXT AVAILABLE"));
}

#[tokio::test]
async fn ambiguous_name_injects_disambiguation_clause() {
    let generator = PassageEchoGenerator::new();
    let pipeline = pipeline_with(generator.clone());

    pipeline.answer("Who was Zaynab?").await.unwrap();

    let prompt = generator.last_prompt();
    assert!(prompt.contains("DISAMBIGUATION:"));
    assert!(prompt.contains("\"Zaynab bint Jahsh\" and \"Zaynab bint Khuzaymah\""));
    assert!(prompt.contains("Umm al-Masakin"));
}

#[tokio::test]
async fn title_question_names_the_title_holder() {
    let generator = PassageEchoGenerator::new();
    let pipeline = pipeline_with(generator.clone());

    let result = pipeline.answer("Who was the Mother of the Needy?").await.unwrap();

    assert!(result.text.contains("Zaynab bint Khuzaymah"));
    let prompt = generator.last_prompt();
    assert!(prompt.contains("KNOWN TITLES:"));
    assert!(prompt.contains("\"Mother of the Needy\" refers to Zaynab bint Khuzaymah"));
}

#[tokio::test]
async fn timeout_once_then_success_returns_text() {
    let generator = ScriptedGenerator::new(vec![Step::Hang, Step::Reply("Her father was Abu Sufyan.")]);
    let pipeline = pipeline_with(generator.clone());

    let result = pipeline.answer("Who was Umm Habibah's father?").await.unwrap();

    assert_eq!(result.text, "Her father was Abu Sufyan.");
    assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn two_generator_failures_surface_generation_error() {
    let generator = ScriptedGenerator::new(vec![Step::Fail, Step::Fail, Step::Reply("unused")]);
    let pipeline = pipeline_with(generator.clone());

    let err = pipeline.answer("Who was Umm Habibah's father?").await.unwrap_err();

    assert!(matches!(
        err,
        AnswerError::Generation {
            attempts: 2,
            source: GenerationError::Status { status: 500, .. }
        }
    ));
    assert_eq!(err.stage(), PipelineStage::Generating);
    assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn ranking_is_deterministic_across_calls() {
    let pipeline = pipeline_with(PassageEchoGenerator::new());

    let first = pipeline.retrieve("Who was Zaynab?").await.unwrap();
    let second = pipeline.retrieve("Who was Zaynab?").await.unwrap();

    fn summarize(ctx: &QueryContext<'_>) -> Vec<(String, u32)> {
        ctx.ranked_passages
            .iter()
            .map(|p| (p.record.id.clone(), p.score.to_bits()))
            .collect()
    }

    assert_eq!(summarize(&first), summarize(&second));
    assert_eq!(first.ranked_passages.len(), 3);
}

#[tokio::test]
async fn concurrent_requests_do_not_share_context() {
    let pipeline = Arc::new(pipeline_with(PassageEchoGenerator::new()));
    let questions = [
        ("Who was Umm Habibah's father?", "umm-habibah-lineage"),
        ("Who was the father of Zaynab bint Jahsh?", "zaynab-jahsh-lineage"),
        ("Why was Zaynab bint Khuzaymah called Mother of the Needy?", "zaynab-khuzaymah-title"),
    ];

    let tasks = questions.iter().cycle().take(12).map(|(question, expected)| {
        let pipeline = pipeline.clone();
        async move {
            let result = pipeline.answer(question).await.unwrap();
            (result, *expected)
        }
    });

    for (result, expected) in join_all(tasks).await {
        assert!(!result.insufficient);
        assert_eq!(result.sources[0].id, expected);
    }
}
