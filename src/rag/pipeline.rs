//! Question in, answer out.
//!
//! `AnswerPipeline` runs Embedder, Ranker, GuardedPromptBuilder and Generator
//! in sequence for one request. The corpus and both backends are shared
//! read-only across concurrent requests; each request owns its own
//! `QueryContext`.

use std::sync::Arc;

use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use super::normalize::{normalize_answer, NormalizedAnswer};
use super::prompt::{ConfusablePair, GuardedPromptBuilder, PromptTemplate};
use super::query::QueryContext;
use super::ranker::{rank, RankedPassage};
use crate::core::config::RagSettings;
use crate::core::errors::{AnswerError, CorpusLoadError, EmbeddingError, GenerationError};
use crate::corpus::Corpus;
use crate::llm::{Embedder, GenerateOptions, Generator};

const PROBE_TEXT: &str = "dimension probe";
const PREVIEW_CHARS: usize = 100;

/// Passage that backed an answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRef {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub score: f32,
}

impl From<&RankedPassage<'_>> for SourceRef {
    fn from(passage: &RankedPassage<'_>) -> Self {
        Self {
            id: passage.record.id.clone(),
            entity: passage.record.entity.clone(),
            section: passage.record.section.clone(),
            score: passage.score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerResult {
    pub text: String,
    /// The passages did not support an answer. Not an error.
    pub insufficient: bool,
    pub sources: Vec<SourceRef>,
}

impl AnswerResult {
    fn insufficient(message: &str) -> Self {
        Self {
            text: message.to_string(),
            insufficient: true,
            sources: Vec::new(),
        }
    }
}

pub struct AnswerPipeline {
    corpus: Arc<Corpus>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    prompt_builder: GuardedPromptBuilder,
    confusable_pairs: Vec<ConfusablePair>,
    top_k: usize,
    min_relevance: f32,
    max_question_length: usize,
    options: GenerateOptions,
}

impl AnswerPipeline {
    pub fn new(
        corpus: Arc<Corpus>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        settings: &RagSettings,
    ) -> Self {
        let guardrails = &settings.guardrails;
        Self {
            corpus,
            embedder,
            generator,
            prompt_builder: GuardedPromptBuilder::new(PromptTemplate {
                persona: guardrails.persona.clone(),
                insufficient_message: guardrails.insufficient_message.clone(),
                entity_titles: guardrails.entity_titles.clone(),
            }),
            confusable_pairs: guardrails.confusable_pairs.clone(),
            top_k: settings.retrieval.top_k.max(1),
            min_relevance: settings.retrieval.min_relevance,
            max_question_length: settings.server.max_question_length,
            options: settings.generation.options().with_max_retries(settings.generation.max_retries),
        }
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn generate_options(&self) -> &GenerateOptions {
        &self.options
    }

    pub fn embedder_name(&self) -> &str {
        self.embedder.name()
    }

    pub fn generator_name(&self) -> &str {
        self.generator.name()
    }

    /// Embeds a probe string once and checks its dimension against the corpus.
    pub async fn verify_embedder(&self) -> Result<(), CorpusLoadError> {
        let vector = self
            .embedder
            .embed(PROBE_TEXT)
            .await
            .map_err(CorpusLoadError::EmbedderProbe)?;

        if vector.len() != self.corpus.dimension() {
            return Err(CorpusLoadError::EmbedderMismatch {
                corpus: self.corpus.dimension(),
                embedder: vector.len(),
            });
        }
        tracing::info!(
            "Embedder '{}' verified: dimension {}",
            self.embedder.name(),
            vector.len()
        );
        Ok(())
    }

    /// Runs the Embedding and Ranking stages and stops before prompting.
    ///
    /// The returned context sits in `PromptBuilding`.
    pub async fn retrieve(&self, question: &str) -> Result<QueryContext<'_>, AnswerError> {
        let question = self.check_question(question)?;
        let mut ctx = QueryContext::new(question);

        ctx.advance();
        let vector = match self.embed_query(&ctx.question).await {
            Ok(vector) => vector,
            Err(err) => {
                ctx.fail();
                return Err(err.into());
            }
        };
        ctx.query_embedding = vector;

        ctx.advance();
        ctx.ranked_passages = rank(&ctx.query_embedding, &self.corpus, self.top_k);
        for passage in &ctx.ranked_passages {
            tracing::debug!(
                score = passage.score,
                id = %passage.record.id,
                "retrieved: {}",
                preview(&passage.record.text)
            );
        }

        ctx.advance();
        Ok(ctx)
    }

    /// Answers one question.
    ///
    /// `insufficient` results are successes. Errors carry no partial text.
    pub async fn answer(&self, question: &str) -> Result<AnswerResult, AnswerError> {
        let span = tracing::info_span!("answer", request_id = %Uuid::new_v4());
        self.answer_inner(question).instrument(span).await
    }

    async fn answer_inner(&self, question: &str) -> Result<AnswerResult, AnswerError> {
        let mut ctx = self.retrieve(question).await?;

        let relevant: Vec<RankedPassage<'_>> = ctx
            .ranked_passages
            .iter()
            .copied()
            .filter(|passage| passage.score >= self.min_relevance)
            .collect();
        if relevant.is_empty() {
            tracing::info!(
                "No passage reached relevance {:.2}; forcing insufficient answer",
                self.min_relevance
            );
        }

        let prompt = self
            .prompt_builder
            .build(&ctx.question, &relevant, &self.confusable_pairs);
        ctx.advance();

        let outcome = self.generate_with_retry(&prompt).await;
        let message = &self.prompt_builder.template().insufficient_message;

        if relevant.is_empty() {
            if let Err(err) = &outcome {
                tracing::warn!("Generator failed on the no-context path: {}", err);
            }
            ctx.advance();
            return Ok(AnswerResult::insufficient(message));
        }

        let result = match outcome {
            Ok(answer) if answer.insufficient => AnswerResult::insufficient(message),
            Ok(answer) => AnswerResult {
                text: answer.text,
                insufficient: false,
                sources: relevant.iter().map(SourceRef::from).collect(),
            },
            Err(err) => {
                ctx.fail();
                tracing::error!("Answer failed: {}", err);
                return Err(err);
            }
        };

        ctx.advance();
        tracing::info!(insufficient = result.insufficient, "Answer ready");
        Ok(result)
    }

    fn check_question<'q>(&self, question: &'q str) -> Result<&'q str, AnswerError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AnswerError::EmptyQuestion);
        }
        let length = question.chars().count();
        if length > self.max_question_length {
            return Err(AnswerError::QuestionTooLong {
                length,
                limit: self.max_question_length,
            });
        }
        Ok(question)
    }

    async fn embed_query(&self, question: &str) -> Result<Vec<f32>, EmbeddingError> {
        let vector = self.embedder.embed(question).await?;

        if vector.is_empty() {
            return Err(EmbeddingError::Malformed("empty query vector".to_string()));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(EmbeddingError::Malformed(
                "non-finite value in query vector".to_string(),
            ));
        }
        if vector.len() != self.corpus.dimension() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.corpus.dimension(),
                found: vector.len(),
            });
        }
        Ok(vector)
    }

    /// Calls the Generator with the same prompt up to `1 + max_retries` times.
    async fn generate_with_retry(&self, prompt: &str) -> Result<NormalizedAnswer, AnswerError> {
        let max_attempts = 1 + self.options.max_retries.min(1);
        let message = &self.prompt_builder.template().insufficient_message;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = match tokio::time::timeout(
                self.options.timeout,
                self.generator.generate(prompt, &self.options),
            )
            .await
            {
                Ok(Ok(raw)) => normalize_answer(&raw, message)
                    .ok_or_else(|| GenerationError::Malformed("empty answer".to_string())),
                Ok(Err(err)) => Err(err),
                Err(_) => Err(GenerationError::Timeout(self.options.timeout)),
            };

            match result {
                Ok(answer) => {
                    if attempt > 1 {
                        tracing::info!("Generator succeeded on attempt {}", attempt);
                    }
                    return Ok(answer);
                }
                Err(err) if attempt < max_attempts => {
                    tracing::warn!(
                        "Generator attempt {}/{} failed: {}. Retrying with the same prompt",
                        attempt,
                        max_attempts,
                        err
                    );
                }
                Err(err) => {
                    return Err(AnswerError::Generation {
                        attempts: attempt,
                        source: err,
                    });
                }
            }
        }
    }
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
