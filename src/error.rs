//! Error types for binsift

use thiserror::Error;

use crate::types::EmbeddingId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid dimension: {0}")]
    InvalidDimension(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}{}", .id.map(|id| format!(" (embedding {})", id)).unwrap_or_default())]
    DimensionMismatch {
        expected: usize,
        actual: usize,
        id: Option<EmbeddingId>,
    },

    #[error("Invalid vector: {0}")]
    InvalidVector(String),

    #[error("Invalid binary code: {0}")]
    InvalidBinaryCode(String),

    #[error("Invalid operator: {0}")]
    InvalidOperator(String),

    #[error("Invalid compare value: {0}")]
    InvalidCompareValue(String),

    #[error("Invalid field: {0}")]
    InvalidField(String),

    #[error("Invalid sort direction: {0}")]
    InvalidDirection(String),

    #[error("Metadata sort on '{0}' requires an explicit cast")]
    MissingCast(String),

    #[error("Unknown filter group: {0}")]
    UnknownFilterGroup(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Journal error: {0}")]
    Journal(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    pub fn journal(msg: impl Into<String>) -> Self {
        Error::Journal(msg.into())
    }

    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Error::DimensionMismatch {
            expected,
            actual,
            id: None,
        }
    }

    /// Whether the error was raised while validating caller input, before any
    /// store access.
    pub fn is_validation(&self) -> bool {
        !matches!(
            self,
            Error::Storage(_) | Error::Journal(_) | Error::Serialization(_) | Error::Io(_)
        )
    }
}
