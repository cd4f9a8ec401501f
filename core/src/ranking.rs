//! Topic scoring and top-N selection.

use std::cmp::Ordering;

use crate::sparse::CscMatrix;
use crate::{ModelError, Result, TermId, TopicId};

/// Per-topic score for a bag of resolved query terms: the sum of each
/// topic's weights over `token_indices` (repeats count again), divided by
/// `max(1, token_indices.len())`.
///
/// Only the queried columns are touched; the one dense allocation is the
/// returned vector of length `n_topics`.
pub fn topic_scores(by_term: &CscMatrix, token_indices: &[TermId]) -> Result<Vec<f64>> {
    let (n_topics, n_terms) = by_term.shape();
    let mut columns: Vec<TermId> = token_indices.to_vec();
    columns.sort_unstable();

    let mut scores = vec![0.0f64; n_topics];
    for group in columns.chunk_by(|a, b| a == b) {
        let j = group[0] as usize;
        if j >= n_terms {
            return Err(ModelError::Dimension(format!("term index {j} out of bounds for {n_terms} terms")));
        }
        let mult = group.len() as f64;
        let (rows, vals) = by_term.column(j);
        for (&r, &v) in rows.iter().zip(vals) {
            scores[r] += v * mult;
        }
    }

    let norm = token_indices.len().max(1) as f64;
    for s in &mut scores {
        *s /= norm;
    }
    Ok(scores)
}

/// Highest scores first, ties by ascending topic id.
fn by_score_desc(a: &(TopicId, f64), b: &(TopicId, f64)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}

/// Takes the `topn` best topics, then keeps those scoring strictly above
/// `thresh`. Thresholding runs after truncation, so fewer than `topn`
/// results may come back but never more.
pub fn top_topics(scores: &[f64], topn: usize, thresh: f64) -> Vec<(TopicId, f64)> {
    if topn == 0 {
        return Vec::new();
    }
    let mut ranked: Vec<(TopicId, f64)> = scores.iter().copied().enumerate().collect();
    if topn < ranked.len() {
        ranked.select_nth_unstable_by(topn - 1, by_score_desc);
        ranked.truncate(topn);
    }
    ranked.sort_by(by_score_desc);
    ranked.retain(|&(_, score)| score > thresh);
    ranked
}

/// Scores every topic for `token_indices` and returns the top of the list.
pub fn rank(by_term: &CscMatrix, token_indices: &[TermId], topn: usize, thresh: f64) -> Result<Vec<(TopicId, f64)>> {
    let scores = topic_scores(by_term, token_indices)?;
    Ok(top_topics(&scores, topn, thresh))
}

/// The `topn` highest-weighted terms of one topic row.
pub fn top_terms(terms: &[TermId], weights: &[f64], topn: usize) -> Vec<(TermId, f64)> {
    let mut ranked: Vec<(TermId, f64)> = terms.iter().copied().zip(weights.iter().copied()).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(topn);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::CsrMatrix;

    fn weights() -> CscMatrix {
        CsrMatrix::from_rows(
            3,
            vec![
                vec![(0, 0.5), (1, 0.2)],
                vec![(0, 0.9)],
                vec![(1, 0.4), (2, 0.1)],
                vec![],
            ],
        )
        .unwrap()
        .to_csc()
    }

    #[test]
    fn scores_sum_columns_and_normalize() {
        let s = topic_scores(&weights(), &[0, 1]).unwrap();
        let expected = [0.35, 0.45, 0.2, 0.0];
        assert_eq!(s.len(), expected.len());
        for (got, want) in s.iter().zip(expected) {
            assert!((got - want).abs() < 1e-12, "{got} != {want}");
        }
    }

    #[test]
    fn repeated_terms_count_twice() {
        let s = topic_scores(&weights(), &[1, 1, 2]).unwrap();
        assert!((s[2] - (0.4 * 2.0 + 0.1) / 3.0).abs() < 1e-12);
    }

    #[test]
    fn empty_query_scores_zero() {
        let s = topic_scores(&weights(), &[]).unwrap();
        assert!(s.iter().all(|&v| v == 0.0));
        assert!(rank(&weights(), &[], 10, 0.0).unwrap().is_empty());
    }

    #[test]
    fn out_of_range_term_is_an_error() {
        assert!(topic_scores(&weights(), &[3]).is_err());
    }

    #[test]
    fn ties_keep_row_order() {
        let scores = [1.0, 2.0, 1.0, 2.0, 1.0];
        let top = top_topics(&scores, 4, 0.0);
        let ids: Vec<TopicId> = top.iter().map(|(i, _)| *i).collect();
        assert_eq!(ids, vec![1, 3, 0, 2]);
    }

    #[test]
    fn threshold_applies_after_truncation() {
        let scores = [0.9, 0.1, 0.8, 0.05];
        assert_eq!(top_topics(&scores, 2, 0.85), vec![(0, 0.9)]);
        assert_eq!(top_topics(&scores, 3, 0.0).len(), 3);
        assert!(top_topics(&scores, 10, 1.0).is_empty());
        assert!(top_topics(&scores, 0, 0.0).is_empty());
    }

    #[test]
    fn ranking_is_deterministic() {
        let a = rank(&weights(), &[0, 1, 2], 10, 0.0).unwrap();
        let b = rank(&weights(), &[0, 1, 2], 10, 0.0).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn top_terms_orders_by_weight() {
        let m = CsrMatrix::from_rows(3, vec![vec![(0, 0.1), (1, 0.7), (2, 0.3)]]).unwrap();
        let (terms, vals) = m.row(0);
        assert_eq!(top_terms(terms, vals, 2), vec![(1, 0.7), (2, 0.3)]);
    }
}
