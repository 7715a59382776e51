//! Unit-length normalization and the dot product used for ranking.

use crate::error::EmbedError;

pub fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|value| value * value).sum::<f32>().sqrt()
}

/// Divides every component by the Euclidean norm.
///
/// Empty and zero-norm vectors are rejected rather than producing NaN.
pub fn normalize(vector: &[f32]) -> Result<Vec<f32>, EmbedError> {
    if vector.is_empty() {
        return Err(EmbedError::EmptyVector);
    }

    let magnitude = l2_norm(vector);
    if magnitude == 0.0 || !magnitude.is_finite() {
        return Err(EmbedError::ZeroNorm);
    }

    Ok(vector.iter().map(|value| value / magnitude).collect())
}

/// Cosine similarity for vectors that are already unit length.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
