//! HTTP API server

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

use crate::search::{SearchConfig, SearchOrchestrator};
use crate::storage::{EmbeddingStore, MemoryDocumentRepository};
use crate::Result;

pub mod handlers;
pub mod state;

pub use state::AppState;

/// Build the API router using the provided application state
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .nest(
            "/v1",
            Router::new()
                .route("/search", post(handlers::search))
                .route(
                    "/documents/:id",
                    put(handlers::put_document)
                        .get(handlers::get_document)
                        .delete(handlers::delete_document),
                )
                .route(
                    "/documents/:id/embeddings",
                    put(handlers::replace_document_embeddings)
                        .get(handlers::document_embeddings),
                )
                .route(
                    "/embeddings",
                    post(handlers::upsert_embedding).get(handlers::list_embeddings),
                )
                .route(
                    "/embeddings/:id",
                    get(handlers::get_embedding).delete(handlers::delete_embedding),
                ),
        )
        .with_state(state)
}

/// Wire an orchestrator over the given store and repository and build the
/// router around it.
pub fn create_app(
    config: SearchConfig,
    embeddings: Arc<dyn EmbeddingStore>,
    documents: Arc<MemoryDocumentRepository>,
) -> Result<Router> {
    let search = SearchOrchestrator::new(config, embeddings.clone(), documents.clone())?;
    Ok(create_router(AppState::new(
        Arc::new(search),
        embeddings,
        documents,
    )))
}
