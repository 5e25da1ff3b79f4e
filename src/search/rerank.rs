//! Stage 2: exact cosine reranking of stage-1 survivors

use std::cmp::Reverse;

use crate::index::vector::{cosine_similarity, magnitude};
use crate::index::{Score, TopK};
use crate::search::SearchHit;
use crate::types::{DocumentId, VectorEntry};
use crate::{Error, Result};

/// Scores candidates by cosine similarity to the raw query vector
#[derive(Debug, Clone, Copy, Default)]
pub struct Reranker;

impl Reranker {
    pub fn new() -> Self {
        Self
    }

    /// Return up to `width` hits in non-increasing similarity, ties broken by
    /// ascending id.
    ///
    /// Candidate magnitudes come from the store; the query magnitude is
    /// computed here. Any candidate whose length differs from the query is a
    /// [`Error::DimensionMismatch`].
    pub fn rerank(&self, query: &[f32], candidates: &[VectorEntry], width: usize) -> Result<Vec<SearchHit>> {
        let query_magnitude = magnitude(query);
        let mut top: TopK<Reverse<Score>, DocumentId> = TopK::new(width);

        for candidate in candidates {
            if candidate.vector.len() != query.len() {
                return Err(Error::DimensionMismatch {
                    expected: query.len(),
                    actual: candidate.vector.len(),
                    id: Some(candidate.id),
                });
            }
            let similarity =
                cosine_similarity(query, query_magnitude, &candidate.vector, candidate.magnitude);
            top.push(Reverse(Score(similarity)), candidate.id, candidate.document_id);
        }

        Ok(top
            .into_sorted_vec()
            .into_iter()
            .map(|(Reverse(Score(similarity)), id, document_id)| SearchHit {
                id,
                document_id,
                similarity,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EmbeddingId;

    fn candidate(id: EmbeddingId, vector: Vec<f32>) -> VectorEntry {
        VectorEntry {
            id,
            document_id: id * 10,
            magnitude: magnitude(&vector),
            vector,
        }
    }

    #[test]
    fn test_orders_by_similarity() {
        let query = [1.0, 0.0, 0.0, 0.0];
        let candidates = vec![
            candidate(1, vec![0.0, 1.0, 0.0, 0.0]),
            candidate(2, vec![2.0, 0.0, 0.0, 0.0]),
            candidate(3, vec![1.0, 1.0, 0.0, 0.0]),
            candidate(4, vec![-1.0, 0.0, 0.0, 0.0]),
        ];

        let hits = Reranker::new().rerank(&query, &candidates, 3).unwrap();
        assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![2, 3, 1]);
        assert!((hits[0].similarity - 1.0).abs() < 1e-5);
        assert_eq!(hits[0].document_id, 20);
        assert!(hits.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    }

    #[test]
    fn test_ties_break_by_ascending_id() {
        let query = [1.0, 1.0, 1.0, 1.0];
        let candidates: Vec<_> = [8, 3, 5]
            .into_iter()
            .map(|id| candidate(id, vec![2.0; 4]))
            .collect();
        let hits = Reranker::new().rerank(&query, &candidates, 2).unwrap();
        assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![3, 5]);
    }

    #[test]
    fn test_zero_vector_scores_zero() {
        let hits = Reranker::new()
            .rerank(&[1.0, 2.0, 3.0, 4.0], &[candidate(1, vec![0.0; 4])], 5)
            .unwrap();
        assert_eq!(hits[0].similarity, 0.0);
    }

    #[test]
    fn test_dimension_mismatch_names_candidate() {
        let err = Reranker::new()
            .rerank(&[1.0; 4], &[candidate(1, vec![1.0; 4]), candidate(7, vec![1.0; 8])], 5)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 4,
                actual: 8,
                id: Some(7)
            }
        ));
    }
}
