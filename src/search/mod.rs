//! Multi-stage search
//!
//! A query runs through a narrowing funnel:
//! 1. the document repository resolves eligible documents,
//! 2. [`CandidateSelector`] keeps the `candidate_factor * k` stored codes
//!    nearest the query code out of at most `scan_cap` scanned,
//! 3. [`Reranker`] keeps the `rerank_factor * k` best by exact cosine,
//! 4. [`ResultSorter`] applies the caller's ordering and trims to `k`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::index::vector;
use crate::index::BinaryQuantizer;
use crate::query::{PredicateBuilder, SortSpec};
use crate::storage::{DocumentRepository, EmbeddingStore};
use crate::types::{DocumentId, DocumentScope, EmbeddingId, DEFAULT_DIMENSION};
use crate::{Error, Result};

pub mod candidate;
pub mod rerank;
pub mod sorter;

pub use candidate::{Candidate, CandidateSelector};
pub use rerank::Reranker;
pub use sorter::ResultSorter;

/// One search result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub id: EmbeddingId,
    pub document_id: DocumentId,
    pub similarity: f32,
}

/// Funnel parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    pub dimension: usize,
    /// Maximum number of stored codes scanned per query
    pub scan_cap: usize,
    /// Stage-1 output width as a multiple of k
    pub candidate_factor: usize,
    /// Stage-2 output width as a multiple of k
    pub rerank_factor: usize,
    /// Kind/status criteria applied to every query
    pub scope: DocumentScope,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
            scan_cap: 1_000_000,
            candidate_factor: 10,
            rerank_factor: 5,
            scope: DocumentScope::default(),
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<()> {
        BinaryQuantizer::new(self.dimension)?;
        if self.scan_cap == 0 {
            return Err(Error::InvalidRequest("scan_cap must be at least 1".to_string()));
        }
        if self.candidate_factor == 0 || self.rerank_factor == 0 {
            return Err(Error::InvalidRequest(
                "candidate_factor and rerank_factor must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn candidate_width(&self, k: usize) -> usize {
        k.saturating_mul(self.candidate_factor)
    }

    pub fn rerank_width(&self, k: usize) -> usize {
        k.saturating_mul(self.rerank_factor)
    }
}

/// Runs the full search funnel against injected storage
pub struct SearchOrchestrator {
    config: SearchConfig,
    quantizer: BinaryQuantizer,
    selector: CandidateSelector,
    reranker: Reranker,
    sorter: ResultSorter,
    embeddings: Arc<dyn EmbeddingStore>,
    documents: Arc<dyn DocumentRepository>,
}

impl SearchOrchestrator {
    pub fn new(
        config: SearchConfig,
        embeddings: Arc<dyn EmbeddingStore>,
        documents: Arc<dyn DocumentRepository>,
    ) -> Result<Self> {
        config.validate()?;
        let quantizer = BinaryQuantizer::new(config.dimension)?;

        Ok(Self {
            config,
            quantizer,
            selector: CandidateSelector::new(quantizer),
            reranker: Reranker::new(),
            sorter: ResultSorter::new(documents.clone()),
            embeddings,
            documents,
        })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Ids of the `k` best embedding records for `query`, in final order.
    pub async fn search(
        &self,
        query: &[f32],
        k: usize,
        predicate: Option<&PredicateBuilder>,
        sort: Option<&SortSpec>,
    ) -> Result<Vec<EmbeddingId>> {
        let hits = self.search_hits(query, k, predicate, sort).await?;
        Ok(hits.into_iter().map(|hit| hit.id).collect())
    }

    /// Like [`search`](Self::search), keeping each hit's document and
    /// similarity.
    pub async fn search_hits(
        &self,
        query: &[f32],
        k: usize,
        predicate: Option<&PredicateBuilder>,
        sort: Option<&SortSpec>,
    ) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Err(Error::InvalidRequest("k must be at least 1".to_string()));
        }
        vector::validate(self.config.dimension, query)?;
        let query_code = self.quantizer.quantize(query)?;
        let expr = predicate.filter(|p| p.has_filters()).map(PredicateBuilder::compile);

        let started = Instant::now();
        let eligible = self
            .documents
            .eligible(&self.config.scope, expr.as_ref())
            .await?;
        tracing::debug!(
            documents = eligible.len(),
            took_us = started.elapsed().as_micros() as u64,
            "Resolved eligible documents"
        );
        if eligible.is_empty() {
            return Ok(Vec::new());
        }

        let stage = Instant::now();
        let codes = self
            .embeddings
            .codes_for_documents(&eligible, self.config.scan_cap)
            .await?;
        let candidates =
            self.selector
                .select(&query_code, &codes, self.config.candidate_width(k))?;
        tracing::debug!(
            scanned = codes.len(),
            survivors = candidates.len(),
            took_us = stage.elapsed().as_micros() as u64,
            "Hamming candidate selection"
        );
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let stage = Instant::now();
        let ids: Vec<EmbeddingId> = candidates.iter().map(|c| c.id).collect();
        let vectors = self.embeddings.vectors(&ids).await?;
        let hits = self
            .reranker
            .rerank(query, &vectors, self.config.rerank_width(k))?;
        tracing::debug!(
            scanned = vectors.len(),
            survivors = hits.len(),
            took_us = stage.elapsed().as_micros() as u64,
            "Cosine rerank"
        );

        let stage = Instant::now();
        let hits = self.sorter.sort(hits, sort, k).await?;
        tracing::debug!(
            survivors = hits.len(),
            sorted = sort.is_some_and(|s| !s.is_empty()),
            took_us = stage.elapsed().as_micros() as u64,
            total_us = started.elapsed().as_micros() as u64,
            "Final ordering"
        );

        Ok(hits)
    }
}
