//! Core types for binsift

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Store-assigned embedding record ID
pub type EmbeddingId = u64;

/// ID of the document that owns a set of chunk embeddings
pub type DocumentId = u64;

/// Vector type
pub type Vector = Vec<f32>;

/// Dimensionality used when none is configured
pub const DEFAULT_DIMENSION: usize = 1024;

/// A stored chunk embedding.
///
/// `(document_id, sequence_no)` is unique and acts as the upsert key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingRecord {
    pub id: EmbeddingId,
    pub document_id: DocumentId,
    pub sequence_no: u32,
    pub vector: Vector,
    pub normalized_vector: Vector,
    pub vector_type: String,
    /// Sign bits packed MSB-first into uppercase hex, D/4 characters
    pub binary_code: String,
    /// L2 norm of `vector`
    pub magnitude: f32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for a single-record upsert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEmbedding {
    pub document_id: DocumentId,
    pub sequence_no: u32,
    pub vector: Vector,
    #[serde(default = "default_vector_type")]
    pub vector_type: String,
}

/// One chunk of a full document replacement; its position in the batch is
/// its sequence number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkEmbedding {
    pub vector: Vector,
    #[serde(default = "default_vector_type")]
    pub vector_type: String,
}

fn default_vector_type() -> String {
    "chunk".to_string()
}

/// Stage-1 projection of a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeEntry {
    pub id: EmbeddingId,
    pub binary_code: String,
}

/// Stage-2 projection of a record
#[derive(Debug, Clone, PartialEq)]
pub struct VectorEntry {
    pub id: EmbeddingId,
    pub document_id: DocumentId,
    pub vector: Vector,
    pub magnitude: f32,
}

/// Attribute value types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AttributeValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

/// A document as seen by the search core: typed attributes plus untyped
/// text metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub kind: String,
    pub status: String,
    #[serde(default)]
    pub attributes: HashMap<String, AttributeValue>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Kind/status criteria every eligible document must meet, independent of
/// caller filters. An empty list places no restriction on that field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentScope {
    #[serde(default)]
    pub kinds: Vec<String>,
    #[serde(default)]
    pub statuses: Vec<String>,
}

impl DocumentScope {
    pub fn any() -> Self {
        Self {
            kinds: Vec::new(),
            statuses: Vec::new(),
        }
    }

    pub fn admits(&self, document: &Document) -> bool {
        (self.kinds.is_empty() || self.kinds.iter().any(|k| k == &document.kind))
            && (self.statuses.is_empty() || self.statuses.iter().any(|s| s == &document.status))
    }
}

impl Default for DocumentScope {
    fn default() -> Self {
        Self {
            kinds: Vec::new(),
            statuses: vec!["published".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(kind: &str, status: &str) -> Document {
        Document {
            id: 1,
            kind: kind.to_string(),
            status: status.to_string(),
            attributes: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn test_scope_admits() {
        let scope = DocumentScope {
            kinds: vec!["post".to_string(), "page".to_string()],
            statuses: vec!["published".to_string()],
        };
        assert!(scope.admits(&doc("post", "published")));
        assert!(!scope.admits(&doc("post", "draft")));
        assert!(!scope.admits(&doc("product", "published")));

        assert!(DocumentScope::any().admits(&doc("anything", "draft")));
        assert!(DocumentScope::default().admits(&doc("anything", "published")));
    }

    #[test]
    fn test_attribute_value_untagged() {
        let values: HashMap<String, AttributeValue> =
            serde_json::from_str(r#"{"a": 3, "b": 2.5, "c": "x", "d": true}"#).unwrap();
        assert_eq!(values["a"], AttributeValue::Integer(3));
        assert_eq!(values["b"], AttributeValue::Float(2.5));
        assert_eq!(values["c"], AttributeValue::String("x".to_string()));
        assert_eq!(values["d"], AttributeValue::Boolean(true));
    }
}
