//! Vector math shared by record derivation and exact reranking

use crate::index::BinaryQuantizer;
use crate::types::Vector;
use crate::{Error, Result};

/// Floor applied to the magnitude before normalizing
pub const NORMALIZE_EPSILON: f32 = 1e-10;

/// Added to the cosine denominator so zero vectors score 0 instead of NaN
pub const COSINE_EPSILON: f64 = 1e-12;

/// Calculate the L2 norm of a vector
pub fn magnitude(vector: &[f32]) -> f32 {
    vector
        .iter()
        .map(|&v| f64::from(v) * f64::from(v))
        .sum::<f64>()
        .sqrt() as f32
}

/// Project a vector onto the unit sphere, never dividing by exact zero.
pub fn normalize(vector: &[f32], magnitude: f32) -> Vector {
    let divisor = magnitude.max(NORMALIZE_EPSILON);
    vector.iter().map(|&v| v / divisor).collect()
}

/// Cosine similarity given precomputed magnitudes.
///
/// Callers must have checked that both slices have the same length.
pub fn cosine_similarity(
    query: &[f32],
    query_magnitude: f32,
    candidate: &[f32],
    candidate_magnitude: f32,
) -> f32 {
    let dot: f64 = query
        .iter()
        .zip(candidate.iter())
        .map(|(&a, &b)| f64::from(a) * f64::from(b))
        .sum();
    let denom = f64::from(query_magnitude) * f64::from(candidate_magnitude) + COSINE_EPSILON;
    (dot / denom) as f32
}

/// Reject vectors of the wrong length or with non-finite coordinates.
pub fn validate(dimension: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != dimension {
        return Err(Error::dimension_mismatch(dimension, vector.len()));
    }
    if let Some(pos) = vector.iter().position(|v| !v.is_finite()) {
        return Err(Error::InvalidVector(format!(
            "coordinate {} is not finite",
            pos
        )));
    }
    Ok(())
}

/// Values stored alongside a raw vector
#[derive(Debug, Clone, PartialEq)]
pub struct Derived {
    pub magnitude: f32,
    pub normalized_vector: Vector,
    pub binary_code: String,
}

/// Compute magnitude, unit projection and sign code for a raw vector.
pub fn derive(quantizer: &BinaryQuantizer, vector: &[f32]) -> Result<Derived> {
    validate(quantizer.dimension(), vector)?;

    let magnitude = magnitude(vector);
    Ok(Derived {
        magnitude,
        normalized_vector: normalize(vector, magnitude),
        binary_code: quantizer.to_binary_code(vector)?,
    })
}
