//! Stage 3: optional caller ordering and the final trim

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::query::{SortSpec, SortValue};
use crate::search::SearchHit;
use crate::storage::{DocumentRepository, FieldValues};
use crate::types::DocumentId;
use crate::Result;

/// Applies a [`SortSpec`] to reranked hits using document field values
pub struct ResultSorter {
    documents: Arc<dyn DocumentRepository>,
}

impl ResultSorter {
    pub fn new(documents: Arc<dyn DocumentRepository>) -> Self {
        Self { documents }
    }

    /// Order `hits` and keep the first `k`.
    ///
    /// Without a sort (or with an empty one) the incoming similarity order is
    /// kept. With one, field values are fetched only for the hits' documents
    /// and similarity plays no part unless a key asks for it; remaining ties
    /// break by ascending embedding id.
    pub async fn sort(
        &self,
        mut hits: Vec<SearchHit>,
        sort: Option<&SortSpec>,
        k: usize,
    ) -> Result<Vec<SearchHit>> {
        let Some(sort) = sort.filter(|s| !s.is_empty()) else {
            hits.truncate(k);
            return Ok(hits);
        };

        let fields = sort.fields();
        let values: HashMap<DocumentId, FieldValues> = if fields.is_empty() {
            HashMap::new()
        } else {
            let document_ids: Vec<DocumentId> = hits
                .iter()
                .map(|hit| hit.document_id)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            self.documents.field_values(&document_ids, &fields).await?
        };

        let mut rows: Vec<(Vec<Option<SortValue>>, SearchHit)> = hits
            .into_iter()
            .map(|hit| {
                let document = values.get(&hit.document_id);
                let row = sort.row_values(hit.similarity, |field| {
                    document.and_then(|fields| fields.get(field))
                });
                (row, hit)
            })
            .collect();

        rows.sort_by(|(a, hit_a), (b, hit_b)| {
            sort.compare(a, b).then_with(|| hit_a.id.cmp(&hit_b.id))
        });

        Ok(rows.into_iter().take(k).map(|(_, hit)| hit).collect())
    }
}
