use serde::Serialize;

use super::ranker::RankedPassage;

/// Where a single answer request currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    Embedding,
    Ranking,
    PromptBuilding,
    Generating,
    Done,
    Failed,
}

impl PipelineStage {
    /// Next stage on the success path. Terminal stages stay put.
    pub fn successor(self) -> Self {
        match self {
            PipelineStage::Idle => PipelineStage::Embedding,
            PipelineStage::Embedding => PipelineStage::Ranking,
            PipelineStage::Ranking => PipelineStage::PromptBuilding,
            PipelineStage::PromptBuilding => PipelineStage::Generating,
            PipelineStage::Generating => PipelineStage::Done,
            PipelineStage::Done => PipelineStage::Done,
            PipelineStage::Failed => PipelineStage::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStage::Done | PipelineStage::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Embedding => "embedding",
            PipelineStage::Ranking => "ranking",
            PipelineStage::PromptBuilding => "prompt_building",
            PipelineStage::Generating => "generating",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        }
    }
}

/// Per-request working state. Owned by one request and never shared.
#[derive(Debug, Clone)]
pub struct QueryContext<'a> {
    pub question: String,
    pub query_embedding: Vec<f32>,
    pub ranked_passages: Vec<RankedPassage<'a>>,
    stage: PipelineStage,
}

impl<'a> QueryContext<'a> {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            query_embedding: Vec::new(),
            ranked_passages: Vec::new(),
            stage: PipelineStage::Idle,
        }
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    /// Moves to the next stage on the success path.
    pub fn advance(&mut self) -> PipelineStage {
        let next = self.stage.successor();
        if next != self.stage {
            tracing::debug!(from = self.stage.as_str(), to = next.as_str(), "pipeline stage");
        }
        self.stage = next;
        next
    }

    /// Marks the request as failed from whatever stage it reached.
    pub fn fail(&mut self) {
        if self.stage != PipelineStage::Failed {
            tracing::debug!(from = self.stage.as_str(), "pipeline failed");
        }
        self.stage = PipelineStage::Failed;
    }
}
