//! In-memory storage backends
//!
//! [`MemoryEmbeddingStore`] keeps all records in memory and optionally
//! journals every mutation so the store survives restarts.
//! [`MemoryDocumentRepository`] evaluates compiled predicates in-process and
//! journals documents the same way.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::{DocumentRepository, EmbeddingStore, FieldValues};
use crate::index::vector::{self, Derived};
use crate::index::BinaryQuantizer;
use crate::query::{Expr, ExprEvaluator, FieldRef, Target};
use crate::types::{
    AttributeValue, ChunkEmbedding, CodeEntry, Document, DocumentId, DocumentScope, EmbeddingId,
    EmbeddingRecord, NewEmbedding, VectorEntry,
};
use crate::wal::{DocumentJournal, DocumentOp, EmbeddingJournal, JournalOp};
use crate::{Error, Result};

/// Record tables with their secondary indexes
#[derive(Debug, Default)]
struct StoreState {
    records: BTreeMap<EmbeddingId, EmbeddingRecord>,
    by_key: HashMap<(DocumentId, u32), EmbeddingId>,
    by_document: HashMap<DocumentId, BTreeSet<EmbeddingId>>,
}

impl StoreState {
    fn insert(&mut self, record: EmbeddingRecord) {
        let key = (record.document_id, record.sequence_no);
        if let Some(previous) = self.by_key.get(&key).copied() {
            if previous != record.id {
                self.remove(previous);
            }
        }

        self.by_key.insert(key, record.id);
        self.by_document
            .entry(record.document_id)
            .or_default()
            .insert(record.id);
        self.records.insert(record.id, record);
    }

    fn remove(&mut self, id: EmbeddingId) -> Option<EmbeddingRecord> {
        let record = self.records.remove(&id)?;
        self.by_key.remove(&(record.document_id, record.sequence_no));
        if let Some(ids) = self.by_document.get_mut(&record.document_id) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_document.remove(&record.document_id);
            }
        }
        Some(record)
    }

    fn remove_document(&mut self, document_id: DocumentId) -> usize {
        let ids = self.by_document.remove(&document_id).unwrap_or_default();
        for id in &ids {
            if let Some(record) = self.records.remove(id) {
                self.by_key.remove(&(record.document_id, record.sequence_no));
            }
        }
        ids.len()
    }

    fn apply(&mut self, op: JournalOp) {
        match op {
            JournalOp::Upsert { record } => self.insert(record),
            JournalOp::ReplaceDocument {
                document_id,
                records,
            } => {
                self.remove_document(document_id);
                for record in records {
                    self.insert(record);
                }
            }
            JournalOp::Delete { id } => {
                self.remove(id);
            }
            JournalOp::DeleteDocument { document_id } => {
                self.remove_document(document_id);
            }
            JournalOp::Snapshot { records, .. } => {
                *self = StoreState::default();
                for record in records {
                    self.insert(record);
                }
            }
        }
    }

    fn document_records(&self, document_id: DocumentId) -> Vec<&EmbeddingRecord> {
        let mut records: Vec<&EmbeddingRecord> = self
            .by_document
            .get(&document_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.records.get(id))
            .collect();
        records.sort_by_key(|r| (r.sequence_no, r.id));
        records
    }
}

type DocumentLocks = DashMap<DocumentId, Arc<Mutex<()>>>;

/// Exclusive write access to one document's records. Dropping it removes the
/// map entry unless another writer is still holding or waiting on it.
struct DocumentGuard<'a> {
    locks: &'a DocumentLocks,
    document_id: DocumentId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for DocumentGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.document_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Embedding store held in memory, optionally backed by a journal
pub struct MemoryEmbeddingStore {
    quantizer: BinaryQuantizer,
    state: RwLock<StoreState>,
    next_id: AtomicU64,
    /// Serializes writers of the same document
    document_locks: DocumentLocks,
    journal: Option<Mutex<EmbeddingJournal>>,
}

impl MemoryEmbeddingStore {
    /// Volatile store for vectors of the given dimension
    pub fn new(dimension: usize) -> Result<Self> {
        Ok(Self {
            quantizer: BinaryQuantizer::new(dimension)?,
            state: RwLock::new(StoreState::default()),
            next_id: AtomicU64::new(1),
            document_locks: DashMap::new(),
            journal: None,
        })
    }

    /// Durable store journaling into `data_dir`, replaying whatever is
    /// already there.
    pub async fn open(dimension: usize, data_dir: impl AsRef<Path>) -> Result<Self> {
        let quantizer = BinaryQuantizer::new(dimension)?;
        let (journal, entries) = EmbeddingJournal::open(data_dir).await?;

        let mut state = StoreState::default();
        let mut next_id: EmbeddingId = 1;
        let replayed = entries.len();

        for entry in entries {
            match &entry.op {
                JournalOp::Upsert { record } => {
                    check_replayed(&quantizer, record)?;
                    next_id = next_id.max(record.id + 1);
                }
                JournalOp::ReplaceDocument { records, .. } => {
                    for record in records {
                        check_replayed(&quantizer, record)?;
                        next_id = next_id.max(record.id + 1);
                    }
                }
                JournalOp::Snapshot {
                    records,
                    next_id: snapshot_next,
                } => {
                    for record in records {
                        check_replayed(&quantizer, record)?;
                    }
                    next_id = next_id.max(*snapshot_next);
                }
                JournalOp::Delete { .. } | JournalOp::DeleteDocument { .. } => {}
            }
            state.apply(entry.op);
        }

        tracing::info!(
            replayed,
            records = state.records.len(),
            next_id,
            "Recovered embedding store from journal"
        );

        Ok(Self {
            quantizer,
            state: RwLock::new(state),
            next_id: AtomicU64::new(next_id),
            document_locks: DashMap::new(),
            journal: Some(Mutex::new(journal)),
        })
    }

    pub fn dimension(&self) -> usize {
        self.quantizer.dimension()
    }

    /// Rewrite the journal as a snapshot of the current contents. A no-op
    /// for volatile stores.
    pub async fn compact(&self) -> Result<()> {
        let Some(journal) = &self.journal else {
            return Ok(());
        };

        let mut journal = journal.lock().await;
        let records: Vec<EmbeddingRecord> = self.state.read().await.records.values().cloned().collect();
        let count = records.len();
        journal
            .compact(JournalOp::Snapshot {
                records,
                next_id: self.next_id.load(Ordering::SeqCst),
            })
            .await?;
        tracing::info!(records = count, "Compacted embedding journal");
        Ok(())
    }

    async fn lock_document(&self, document_id: DocumentId) -> DocumentGuard<'_> {
        let lock = self
            .document_locks
            .entry(document_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        DocumentGuard {
            locks: &self.document_locks,
            document_id,
            guard: Some(lock.lock_owned().await),
        }
    }

    fn allocate_id(&self) -> EmbeddingId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Journal an operation, then apply it. The journal lock is held until
    /// the operation is visible so compaction never drops it.
    async fn commit(&self, op: JournalOp) -> Result<()> {
        let mut journal = match &self.journal {
            Some(journal) => Some(journal.lock().await),
            None => None,
        };
        if let Some(journal) = journal.as_mut() {
            journal.append(op.clone()).await?;
        }
        self.state.write().await.apply(op);
        Ok(())
    }

    fn build_record(
        &self,
        id: EmbeddingId,
        document_id: DocumentId,
        sequence_no: u32,
        vector: Vec<f32>,
        vector_type: String,
        derived: Derived,
    ) -> EmbeddingRecord {
        let now = Utc::now();
        EmbeddingRecord {
            id,
            document_id,
            sequence_no,
            vector,
            normalized_vector: derived.normalized_vector,
            vector_type,
            binary_code: derived.binary_code,
            magnitude: derived.magnitude,
            created_at: now,
            updated_at: now,
        }
    }
}

fn check_replayed(quantizer: &BinaryQuantizer, record: &EmbeddingRecord) -> Result<()> {
    if record.vector.len() != quantizer.dimension() {
        return Err(Error::journal(format!(
            "record {} has dimension {}, store expects {}",
            record.id,
            record.vector.len(),
            quantizer.dimension()
        )));
    }
    Ok(())
}

#[async_trait]
impl EmbeddingStore for MemoryEmbeddingStore {
    async fn init(&self) -> Result<()> {
        if let Some(journal) = &self.journal {
            journal.lock().await.sync().await?;
        }
        tracing::debug!(dimension = self.dimension(), "Embedding store ready");
        Ok(())
    }

    async fn get(&self, id: EmbeddingId) -> Result<Option<EmbeddingRecord>> {
        Ok(self.state.read().await.records.get(&id).cloned())
    }

    async fn get_many(&self, ids: &[EmbeddingId], preserve_order: bool) -> Result<Vec<EmbeddingRecord>> {
        let state = self.state.read().await;
        if preserve_order {
            return Ok(ids
                .iter()
                .filter_map(|id| state.records.get(id).cloned())
                .collect());
        }

        let unique: BTreeSet<EmbeddingId> = ids.iter().copied().collect();
        Ok(unique
            .iter()
            .filter_map(|id| state.records.get(id).cloned())
            .collect())
    }

    async fn for_document(&self, document_id: DocumentId) -> Result<Vec<EmbeddingRecord>> {
        let state = self.state.read().await;
        Ok(state
            .document_records(document_id)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn find(&self, document_id: DocumentId, sequence_no: u32) -> Result<Option<EmbeddingRecord>> {
        let state = self.state.read().await;
        Ok(state
            .by_key
            .get(&(document_id, sequence_no))
            .and_then(|id| state.records.get(id))
            .cloned())
    }

    async fn latest_for_document(&self, document_id: DocumentId) -> Result<Option<EmbeddingRecord>> {
        let state = self.state.read().await;
        Ok(state
            .document_records(document_id)
            .into_iter()
            .max_by_key(|r| (r.updated_at, r.id))
            .cloned())
    }

    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<EmbeddingRecord>> {
        let state = self.state.read().await;
        Ok(state
            .records
            .values()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn upsert(&self, embedding: NewEmbedding) -> Result<EmbeddingRecord> {
        let derived = vector::derive(&self.quantizer, &embedding.vector)?;

        let _guard = self.lock_document(embedding.document_id).await;

        let existing = self.find(embedding.document_id, embedding.sequence_no).await?;
        let record = match existing {
            Some(current)
                if current.vector == embedding.vector
                    && current.vector_type == embedding.vector_type =>
            {
                return Ok(current);
            }
            Some(current) => {
                let mut record = self.build_record(
                    current.id,
                    embedding.document_id,
                    embedding.sequence_no,
                    embedding.vector,
                    embedding.vector_type,
                    derived,
                );
                record.created_at = current.created_at;
                record
            }
            None => self.build_record(
                self.allocate_id(),
                embedding.document_id,
                embedding.sequence_no,
                embedding.vector,
                embedding.vector_type,
                derived,
            ),
        };

        self.commit(JournalOp::Upsert {
            record: record.clone(),
        })
        .await?;

        tracing::debug!(
            id = record.id,
            document_id = record.document_id,
            sequence_no = record.sequence_no,
            "Upserted embedding"
        );
        Ok(record)
    }

    async fn replace_document(
        &self,
        document_id: DocumentId,
        chunks: Vec<ChunkEmbedding>,
    ) -> Result<Vec<EmbeddingRecord>> {
        let chunk_count = u32::try_from(chunks.len())
            .map_err(|_| Error::InvalidRequest(format!("too many chunks: {}", chunks.len())))?;
        let derived = chunks
            .iter()
            .map(|chunk| vector::derive(&self.quantizer, &chunk.vector))
            .collect::<Result<Vec<_>>>()?;

        let _guard = self.lock_document(document_id).await;

        let records: Vec<EmbeddingRecord> = chunks
            .into_iter()
            .zip(derived)
            .zip(0..chunk_count)
            .map(|((chunk, derived), sequence_no)| {
                self.build_record(
                    self.allocate_id(),
                    document_id,
                    sequence_no,
                    chunk.vector,
                    chunk.vector_type,
                    derived,
                )
            })
            .collect();

        self.commit(JournalOp::ReplaceDocument {
            document_id,
            records: records.clone(),
        })
        .await?;

        tracing::debug!(document_id, chunks = records.len(), "Replaced document embeddings");
        Ok(records)
    }

    async fn delete(&self, id: EmbeddingId) -> Result<bool> {
        let Some(document_id) = self.state.read().await.records.get(&id).map(|r| r.document_id) else {
            return Ok(false);
        };

        let _guard = self.lock_document(document_id).await;

        if !self.state.read().await.records.contains_key(&id) {
            return Ok(false);
        }
        self.commit(JournalOp::Delete { id }).await?;
        Ok(true)
    }

    async fn delete_document(&self, document_id: DocumentId) -> Result<usize> {
        let _guard = self.lock_document(document_id).await;

        let count = self
            .state
            .read()
            .await
            .by_document
            .get(&document_id)
            .map_or(0, BTreeSet::len);
        if count == 0 {
            return Ok(0);
        }

        self.commit(JournalOp::DeleteDocument { document_id }).await?;
        Ok(count)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.state.read().await.records.len())
    }

    async fn codes_for_documents(&self, document_ids: &[DocumentId], cap: usize) -> Result<Vec<CodeEntry>> {
        let state = self.state.read().await;
        let mut ids: Vec<EmbeddingId> = document_ids
            .iter()
            .filter_map(|document_id| state.by_document.get(document_id))
            .flatten()
            .copied()
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids.truncate(cap);

        Ok(ids
            .into_iter()
            .filter_map(|id| state.records.get(&id))
            .map(|record| CodeEntry {
                id: record.id,
                binary_code: record.binary_code.clone(),
            })
            .collect())
    }

    async fn vectors(&self, ids: &[EmbeddingId]) -> Result<Vec<VectorEntry>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.records.get(id))
            .map(|record| VectorEntry {
                id: record.id,
                document_id: record.document_id,
                vector: record.vector.clone(),
                magnitude: record.magnitude,
            })
            .collect())
    }
}

/// Document repository held in memory, optionally backed by a journal
#[derive(Default)]
pub struct MemoryDocumentRepository {
    documents: RwLock<BTreeMap<DocumentId, Document>>,
    journal: Option<Mutex<DocumentJournal>>,
}

impl MemoryDocumentRepository {
    /// Volatile repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Durable repository journaling into `data_dir`, replaying whatever is
    /// already there.
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let (journal, entries) = DocumentJournal::open(data_dir).await?;

        let mut documents = BTreeMap::new();
        let replayed = entries.len();
        for entry in entries {
            apply_document_op(&mut documents, entry.op);
        }

        tracing::info!(
            replayed,
            documents = documents.len(),
            "Recovered document repository from journal"
        );

        Ok(Self {
            documents: RwLock::new(documents),
            journal: Some(Mutex::new(journal)),
        })
    }

    /// Insert or replace a document, returning the previous version.
    pub async fn put(&self, document: Document) -> Result<Option<Document>> {
        let id = document.id;
        let previous = self.commit(DocumentOp::Put { document }).await?;
        tracing::debug!(document_id = id, "Stored document");
        Ok(previous)
    }

    pub async fn remove(&self, id: DocumentId) -> Result<Option<Document>> {
        if !self.documents.read().await.contains_key(&id) {
            return Ok(None);
        }
        self.commit(DocumentOp::Remove { id }).await
    }

    pub async fn get(&self, id: DocumentId) -> Option<Document> {
        self.documents.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    /// Rewrite the journal as a snapshot of the current documents. A no-op
    /// for volatile repositories.
    pub async fn compact(&self) -> Result<()> {
        let Some(journal) = &self.journal else {
            return Ok(());
        };

        let mut journal = journal.lock().await;
        let documents: Vec<Document> = self.documents.read().await.values().cloned().collect();
        let count = documents.len();
        journal.compact(DocumentOp::Snapshot { documents }).await?;
        tracing::info!(documents = count, "Compacted document journal");
        Ok(())
    }

    /// Journal an operation, then apply it, returning the document it
    /// replaced or removed.
    async fn commit(&self, op: DocumentOp) -> Result<Option<Document>> {
        let mut journal = match &self.journal {
            Some(journal) => Some(journal.lock().await),
            None => None,
        };
        if let Some(journal) = journal.as_mut() {
            journal.append(op.clone()).await?;
        }
        Ok(apply_document_op(&mut *self.documents.write().await, op))
    }
}

fn apply_document_op(
    documents: &mut BTreeMap<DocumentId, Document>,
    op: DocumentOp,
) -> Option<Document> {
    match op {
        DocumentOp::Put { document } => documents.insert(document.id, document),
        DocumentOp::Remove { id } => documents.remove(&id),
        DocumentOp::Snapshot { documents: snapshot } => {
            *documents = snapshot.into_iter().map(|d| (d.id, d)).collect();
            None
        }
    }
}

#[async_trait]
impl DocumentRepository for MemoryDocumentRepository {
    async fn eligible(&self, scope: &DocumentScope, predicate: Option<&Expr>) -> Result<Vec<DocumentId>> {
        let documents = self.documents.read().await;
        Ok(documents
            .values()
            .filter(|document| scope.admits(document))
            .filter(|document| predicate.map_or(true, |expr| ExprEvaluator::matches(expr, document)))
            .map(|document| document.id)
            .collect())
    }

    async fn field_values(
        &self,
        ids: &[DocumentId],
        fields: &[FieldRef],
    ) -> Result<HashMap<DocumentId, FieldValues>> {
        let documents = self.documents.read().await;
        let mut out = HashMap::with_capacity(ids.len());

        for id in ids {
            let Some(document) = documents.get(id) else {
                continue;
            };
            let values: FieldValues = fields
                .iter()
                .filter_map(|field| {
                    let value = match field.target {
                        Target::Attribute => document.attributes.get(&field.name).cloned(),
                        Target::Metadata => document
                            .metadata
                            .get(&field.name)
                            .map(|text| AttributeValue::String(text.clone())),
                    };
                    value.map(|v| (field.clone(), v))
                })
                .collect();
            out.insert(*id, values);
        }

        Ok(out)
    }
}
