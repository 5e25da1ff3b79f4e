//! Stage 1: approximate candidate selection by Hamming distance

use crate::index::{BinaryCode, BinaryQuantizer, TopK};
use crate::types::{CodeEntry, EmbeddingId};
use crate::Result;

/// A stage-1 survivor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub id: EmbeddingId,
    pub distance: u32,
}

/// Keeps the stored codes closest to the query code
#[derive(Debug, Clone, Copy)]
pub struct CandidateSelector {
    quantizer: BinaryQuantizer,
}

impl CandidateSelector {
    pub fn new(quantizer: BinaryQuantizer) -> Self {
        Self { quantizer }
    }

    /// Return up to `width` entries in non-decreasing Hamming distance from
    /// `query`, ties broken by ascending id.
    ///
    /// A stored code that does not parse fails the whole call.
    pub fn select(&self, query: &BinaryCode, entries: &[CodeEntry], width: usize) -> Result<Vec<Candidate>> {
        let mut top: TopK<u32> = TopK::new(width);
        for entry in entries {
            let code = self.quantizer.parse(&entry.binary_code)?;
            top.push(query.hamming(&code), entry.id, ());
        }

        Ok(top
            .into_sorted_vec()
            .into_iter()
            .map(|(distance, id, ())| Candidate { id, distance })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn entry(id: EmbeddingId, code: &str) -> CodeEntry {
        CodeEntry {
            id,
            binary_code: code.to_string(),
        }
    }

    #[test]
    fn test_exact_match_ranks_first() {
        let quantizer = BinaryQuantizer::new(8).unwrap();
        let selector = CandidateSelector::new(quantizer);
        let query = quantizer.quantize(&[1.0, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0]).unwrap();

        let out = selector
            .select(&query, &[entry(2, "2A"), entry(1, "AA"), entry(3, "55")], 10)
            .unwrap();
        assert_eq!(
            out,
            vec![
                Candidate { id: 1, distance: 0 },
                Candidate { id: 2, distance: 1 },
                Candidate { id: 3, distance: 8 },
            ]
        );
    }

    #[test]
    fn test_width_and_tie_break() {
        let quantizer = BinaryQuantizer::new(4).unwrap();
        let selector = CandidateSelector::new(quantizer);
        let query = quantizer.parse("0").unwrap();

        let entries = [entry(9, "1"), entry(4, "2"), entry(7, "F"), entry(5, "8"), entry(6, "0")];
        let out = selector.select(&query, &entries, 3).unwrap();

        let ids: Vec<_> = out.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![6, 4, 5]);
        assert!(out.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn test_empty_input() {
        let quantizer = BinaryQuantizer::new(4).unwrap();
        let selector = CandidateSelector::new(quantizer);
        let query = quantizer.parse("A").unwrap();
        assert!(selector.select(&query, &[], 10).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_code_is_an_error() {
        let quantizer = BinaryQuantizer::new(8).unwrap();
        let selector = CandidateSelector::new(quantizer);
        let query = quantizer.parse("AA").unwrap();
        assert!(matches!(
            selector.select(&query, &[entry(1, "A")], 10),
            Err(Error::InvalidBinaryCode(_))
        ));
    }
}
