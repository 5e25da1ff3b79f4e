//! binsift - chunk-level embedding search over binary-quantized codes
//!
//! Queries run through a narrowing funnel:
//! - Sign-bit quantization and Hamming distance for cheap candidate selection
//! - Exact cosine reranking over the survivors
//! - Caller-supplied filter groups and sort keys compiled to plain data
//! - In-memory storage with an optional write-ahead journal
//! - Simple HTTP API

pub mod api;
pub mod config;
pub mod error;
pub mod index;
pub mod query;
pub mod search;
pub mod storage;
pub mod types;
pub mod wal;

pub use error::{Error, Result};
