//! API server state

use std::sync::Arc;

use crate::search::SearchOrchestrator;
use crate::storage::{EmbeddingStore, MemoryDocumentRepository};

/// API server state
#[derive(Clone)]
pub struct AppState {
    pub search: Arc<SearchOrchestrator>,

    /// Chunk embeddings, shared with the orchestrator
    pub embeddings: Arc<dyn EmbeddingStore>,

    /// Documents, shared with the orchestrator
    pub documents: Arc<MemoryDocumentRepository>,
}

impl AppState {
    pub fn new(
        search: Arc<SearchOrchestrator>,
        embeddings: Arc<dyn EmbeddingStore>,
        documents: Arc<MemoryDocumentRepository>,
    ) -> Self {
        Self {
            search,
            embeddings,
            documents,
        }
    }
}
