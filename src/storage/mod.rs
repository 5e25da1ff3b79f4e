//! Storage abstraction layer
//!
//! The search core talks to two collaborators: an embedding store holding
//! chunk records, and a document repository answering eligibility and
//! field lookups. Both are injected as trait objects.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::query::{Expr, FieldRef};
use crate::types::{
    AttributeValue, ChunkEmbedding, CodeEntry, DocumentId, DocumentScope, EmbeddingId,
    EmbeddingRecord, NewEmbedding, VectorEntry,
};
use crate::Result;

pub mod memory;

pub use memory::{MemoryDocumentRepository, MemoryEmbeddingStore};

/// Field values of one document, keyed by the requested field. Metadata is
/// returned as [`AttributeValue::String`].
pub type FieldValues = HashMap<FieldRef, AttributeValue>;

/// Chunk embedding storage
#[async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// Prepare the store for use. Safe to call more than once.
    async fn init(&self) -> Result<()>;

    async fn get(&self, id: EmbeddingId) -> Result<Option<EmbeddingRecord>>;

    /// Fetch several records. With `preserve_order` the output follows `ids`
    /// (missing ids skipped), otherwise it is in ascending id order.
    async fn get_many(&self, ids: &[EmbeddingId], preserve_order: bool) -> Result<Vec<EmbeddingRecord>>;

    /// All chunks of a document in sequence order
    async fn for_document(&self, document_id: DocumentId) -> Result<Vec<EmbeddingRecord>>;

    async fn find(&self, document_id: DocumentId, sequence_no: u32) -> Result<Option<EmbeddingRecord>>;

    /// Most recently updated chunk of a document
    async fn latest_for_document(&self, document_id: DocumentId) -> Result<Option<EmbeddingRecord>>;

    /// Page through all records in ascending id order
    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<EmbeddingRecord>>;

    /// Insert or update the record keyed by `(document_id, sequence_no)`.
    async fn upsert(&self, embedding: NewEmbedding) -> Result<EmbeddingRecord>;

    /// Replace every chunk of a document. Chunk `i` gets sequence number `i`.
    async fn replace_document(
        &self,
        document_id: DocumentId,
        chunks: Vec<ChunkEmbedding>,
    ) -> Result<Vec<EmbeddingRecord>>;

    /// Returns whether a record was removed.
    async fn delete(&self, id: EmbeddingId) -> Result<bool>;

    /// Returns the number of records removed.
    async fn delete_document(&self, document_id: DocumentId) -> Result<usize>;

    async fn count(&self) -> Result<usize>;

    /// Codes of records owned by `document_ids`, ascending by id, at most
    /// `cap` of them.
    async fn codes_for_documents(&self, document_ids: &[DocumentId], cap: usize) -> Result<Vec<CodeEntry>>;

    /// Raw vectors for exactly the given ids. Ids no longer present are
    /// skipped.
    async fn vectors(&self, ids: &[EmbeddingId]) -> Result<Vec<VectorEntry>>;
}

/// Host document repository
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Ids of documents admitted by `scope` and matching `predicate`, in
    /// ascending order.
    async fn eligible(&self, scope: &DocumentScope, predicate: Option<&Expr>) -> Result<Vec<DocumentId>>;

    /// Values of `fields` for each of `ids`. Documents that do not exist are
    /// absent from the map, and absent fields are absent from a document's
    /// values.
    async fn field_values(
        &self,
        ids: &[DocumentId],
        fields: &[FieldRef],
    ) -> Result<HashMap<DocumentId, FieldValues>>;
}
