//! Top-K passage selection by cosine similarity.

use crate::corpus::{Corpus, PassageRecord};
use crate::vector_math::rank_descending_by_cosine;

/// A passage paired with its similarity to the query.
#[derive(Debug, Clone, Copy)]
pub struct RankedPassage<'a> {
    pub record: &'a PassageRecord,
    /// Position of the record in the corpus.
    pub index: usize,
    pub score: f32,
}

/// Returns the `k` most similar passages in descending score order.
///
/// Every call re-scans the whole corpus. Exact score ties keep corpus order.
/// Returns all records when the corpus holds fewer than `k`.
pub fn rank<'a>(query_embedding: &[f32], corpus: &'a Corpus, k: usize) -> Vec<RankedPassage<'a>> {
    if k == 0 {
        return Vec::new();
    }

    let mut scored = rank_descending_by_cosine(
        query_embedding,
        corpus.records().iter().map(|record| record.embedding.as_slice()),
    );
    scored.truncate(k);

    scored
        .into_iter()
        .filter_map(|(index, score)| {
            corpus.get(index).map(|record| RankedPassage {
                record,
                index,
                score,
            })
        })
        .collect()
}
