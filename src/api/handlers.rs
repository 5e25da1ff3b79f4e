//! API handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;

use crate::api::AppState;
use crate::query::{PredicateBuilder, SearchRequest, SearchResponse, SortSpec};
use crate::types::{
    AttributeValue, ChunkEmbedding, Document, DocumentId, EmbeddingId, EmbeddingRecord,
    NewEmbedding,
};
use crate::Error;

type ApiError = (StatusCode, String);

/// Validation failures are the caller's fault; everything else is ours.
fn api_error(err: Error) -> ApiError {
    if err.is_validation() {
        (StatusCode::BAD_REQUEST, err.to_string())
    } else {
        tracing::error!(error = %err, "Request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

fn not_found(what: &str, id: u64) -> ApiError {
    (StatusCode::NOT_FOUND, format!("{} {} not found", what, id))
}

/// Health check with store status
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let embeddings = state.embeddings.count().await.map_err(api_error)?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        embeddings,
        documents: state.documents.len().await,
    }))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub embeddings: usize,
    pub documents: usize,
}

/// Run a filtered, optionally sorted vector search
pub async fn search(
    State(state): State<AppState>,
    Json(payload): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let start = Instant::now();

    let predicate = PredicateBuilder::from_specs(&payload.filter_groups).map_err(api_error)?;
    let sort = SortSpec::from_specs(&payload.sort).map_err(api_error)?;

    let results = state
        .search
        .search_hits(&payload.vector, payload.top_k, Some(&predicate), Some(&sort))
        .await
        .map_err(api_error)?;

    let took_ms = start.elapsed().as_millis() as u64;
    tracing::info!(results = results.len(), took_ms, "Search completed");

    Ok(Json(SearchResponse { results, took_ms }))
}

#[derive(Debug, Deserialize)]
pub struct PutDocumentRequest {
    pub kind: String,
    pub status: String,
    #[serde(default)]
    pub attributes: HashMap<String, AttributeValue>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Create or replace a document
pub async fn put_document(
    State(state): State<AppState>,
    Path(id): Path<DocumentId>,
    Json(payload): Json<PutDocumentRequest>,
) -> Result<Json<Document>, ApiError> {
    let document = Document {
        id,
        kind: payload.kind,
        status: payload.status,
        attributes: payload.attributes,
        metadata: payload.metadata,
    };
    state
        .documents
        .put(document.clone())
        .await
        .map_err(api_error)?;
    Ok(Json(document))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<DocumentId>,
) -> Result<Json<Document>, ApiError> {
    state
        .documents
        .get(id)
        .await
        .map(Json)
        .ok_or_else(|| not_found("document", id))
}

#[derive(Debug, Serialize)]
pub struct DeleteDocumentResponse {
    pub deleted: bool,
    pub embeddings_removed: usize,
}

/// Delete a document together with all of its chunk embeddings
pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<DocumentId>,
) -> Result<Json<DeleteDocumentResponse>, ApiError> {
    let embeddings_removed = state
        .embeddings
        .delete_document(id)
        .await
        .map_err(api_error)?;
    let deleted = state
        .documents
        .remove(id)
        .await
        .map_err(api_error)?
        .is_some();

    Ok(Json(DeleteDocumentResponse {
        deleted,
        embeddings_removed,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ReplaceEmbeddingsRequest {
    pub chunks: Vec<ChunkEmbedding>,
}

/// Replace every chunk embedding of a document
pub async fn replace_document_embeddings(
    State(state): State<AppState>,
    Path(id): Path<DocumentId>,
    Json(payload): Json<ReplaceEmbeddingsRequest>,
) -> Result<Json<Vec<EmbeddingRecord>>, ApiError> {
    let records = state
        .embeddings
        .replace_document(id, payload.chunks)
        .await
        .map_err(api_error)?;
    Ok(Json(records))
}

pub async fn document_embeddings(
    State(state): State<AppState>,
    Path(id): Path<DocumentId>,
) -> Result<Json<Vec<EmbeddingRecord>>, ApiError> {
    let records = state.embeddings.for_document(id).await.map_err(api_error)?;
    Ok(Json(records))
}

/// Insert or update one chunk embedding
pub async fn upsert_embedding(
    State(state): State<AppState>,
    Json(payload): Json<NewEmbedding>,
) -> Result<Json<EmbeddingRecord>, ApiError> {
    let record = state.embeddings.upsert(payload).await.map_err(api_error)?;
    Ok(Json(record))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

pub async fn list_embeddings(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<EmbeddingRecord>>, ApiError> {
    let records = state
        .embeddings
        .list(params.offset, params.limit.min(1000))
        .await
        .map_err(api_error)?;
    Ok(Json(records))
}

pub async fn get_embedding(
    State(state): State<AppState>,
    Path(id): Path<EmbeddingId>,
) -> Result<Json<EmbeddingRecord>, ApiError> {
    state
        .embeddings
        .get(id)
        .await
        .map_err(api_error)?
        .map(Json)
        .ok_or_else(|| not_found("embedding", id))
}

#[derive(Debug, Serialize)]
pub struct DeleteEmbeddingResponse {
    pub deleted: bool,
}

pub async fn delete_embedding(
    State(state): State<AppState>,
    Path(id): Path<EmbeddingId>,
) -> Result<Json<DeleteEmbeddingResponse>, ApiError> {
    let deleted = state.embeddings.delete(id).await.map_err(api_error)?;
    Ok(Json(DeleteEmbeddingResponse { deleted }))
}
