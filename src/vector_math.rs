use std::cmp::Ordering;

/// Cosine similarity of two vectors.
///
/// Returns 0.0 when either vector has zero magnitude or the lengths differ.
/// Accumulates in f64 so that scaling a vector never reorders near-ties.
pub fn cosine_similarity(query: &[f32], candidate: &[f32]) -> f32 {
    if query.is_empty() || query.len() != candidate.len() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut query_sq = 0.0f64;
    let mut candidate_sq = 0.0f64;
    for (q, c) in query.iter().zip(candidate) {
        let (q, c) = (f64::from(*q), f64::from(*c));
        dot += q * c;
        query_sq += q * q;
        candidate_sq += c * c;
    }

    let denom = query_sq.sqrt() * candidate_sq.sqrt();
    if denom <= f64::EPSILON {
        return 0.0;
    }

    (dot / denom).clamp(-1.0, 1.0) as f32
}

/// Scores every candidate and sorts by descending similarity.
///
/// The sort is stable, so exact ties keep their input order.
pub fn rank_descending_by_cosine<'a, I>(query: &[f32], candidates: I) -> Vec<(usize, f32)>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut scores: Vec<(usize, f32)> = candidates
        .into_iter()
        .enumerate()
        .map(|(idx, candidate)| (idx, cosine_similarity(query, candidate)))
        .collect();

    scores.sort_by(|left, right| descending(left.1, right.1));
    scores
}

fn descending(left: f32, right: f32) -> Ordering {
    right.partial_cmp(&left).unwrap_or(Ordering::Equal)
}

/// Magnitude of a vector, used to reject degenerate embeddings.
pub fn l2_norm(vector: &[f32]) -> f32 {
    vector
        .iter()
        .map(|v| f64::from(*v) * f64::from(*v))
        .sum::<f64>()
        .sqrt() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(left: f32, right: f32) -> bool {
        (left - right).abs() < 1e-5
    }

    #[test]
    fn cosine_is_one_for_identical_vectors() {
        let vec = vec![1.0, 2.0, 3.0, 4.0];
        assert!(approx_eq(cosine_similarity(&vec, &vec), 1.0));
    }

    #[test]
    fn cosine_is_zero_for_orthogonal_vectors() {
        assert!(approx_eq(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0));
    }

    #[test]
    fn cosine_is_zero_when_a_vector_has_no_magnitude() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[0.3, 0.4]), 0.0);
        assert_eq!(cosine_similarity(&[0.3, 0.4], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn cosine_is_symmetric_and_scale_invariant() {
        let a = [0.2, -0.7, 0.4];
        let b = [0.9, 0.1, -0.3];
        assert!(approx_eq(cosine_similarity(&a, &b), cosine_similarity(&b, &a)));

        let scaled: Vec<f32> = b.iter().map(|v| v * 42.5).collect();
        assert!(approx_eq(cosine_similarity(&a, &b), cosine_similarity(&a, &scaled)));
    }

    #[test]
    fn ranking_returns_highest_similarity_first() {
        let query = vec![1.0, 0.0];
        let candidates = vec![vec![0.8, 0.2], vec![0.1, 0.9], vec![0.9, 0.0]];
        let ranked = rank_descending_by_cosine(&query, candidates.iter().map(Vec::as_slice));

        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].0, 2);
        assert_eq!(ranked[2].0, 1);
    }

    #[test]
    fn ranking_keeps_input_order_for_ties() {
        let query = vec![1.0, 1.0];
        let candidates = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![2.0, 0.0]];
        let ranked = rank_descending_by_cosine(&query, candidates.iter().map(Vec::as_slice));

        let order: Vec<usize> = ranked.iter().map(|(idx, _)| *idx).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn l2_norm_of_three_four_is_five() {
        assert!(approx_eq(l2_norm(&[3.0, 4.0]), 5.0));
    }
}
