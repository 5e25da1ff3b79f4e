//! Quantization, vector math and bounded selection used by the search funnel

pub mod binary;
pub mod topk;
pub mod vector;

pub use binary::{BinaryCode, BinaryQuantizer};
pub use topk::{Score, TopK};
