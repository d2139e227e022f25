mod normalize;
mod pipeline;
mod prompt;
mod query;
mod ranker;

pub use normalize::{normalize_answer, NormalizedAnswer};
pub use pipeline::{AnswerPipeline, AnswerResult, SourceRef};
pub use prompt::{ConfusablePair, EntityTitle, GuardedPromptBuilder, PromptTemplate};
pub use query::{PipelineStage, QueryContext};
pub use ranker::{rank, RankedPassage};
