//! Scalar vector operations
//!
//! Dimension-checked reference implementations of the distance kernels.
//! The search hot path uses the SIMD versions in [`super::simd`]; these are
//! used for validation, normalization at insert time, and in tests.

use crate::{OmegaError, Result};

#[inline]
fn check_dimensions(a: &[f32], b: &[f32]) -> Result<()> {
    if a.len() != b.len() {
        return Err(OmegaError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(())
}

/// Computes the dot product of two vectors.
///
/// # Errors
///
/// Returns `OmegaError::DimensionMismatch` if the vectors have different dimensions.
///
/// # Examples
///
/// ```
/// use omega_core::vector::ops::dot_product;
///
/// let a = vec![1.0, 2.0, 3.0];
/// let b = vec![4.0, 5.0, 6.0];
/// let product = dot_product(&a, &b).unwrap();
/// assert!((product - 32.0).abs() < 1e-6);
/// ```
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> Result<f32> {
    check_dimensions(a, b)?;
    Ok(a.iter().zip(b.iter()).map(|(x, y)| x * y).sum())
}

/// Computes the squared Euclidean distance between two vectors.
///
/// # Errors
///
/// Returns `OmegaError::DimensionMismatch` if the vectors have different dimensions.
///
/// # Examples
///
/// ```
/// use omega_core::vector::ops::squared_l2;
///
/// let a = vec![0.0, 0.0];
/// let b = vec![3.0, 4.0];
/// assert!((squared_l2(&a, &b).unwrap() - 25.0).abs() < 1e-6);
/// ```
#[inline]
pub fn squared_l2(a: &[f32], b: &[f32]) -> Result<f32> {
    check_dimensions(a, b)?;
    Ok(a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum())
}

/// Computes the cosine similarity between two vectors, in [-1, 1].
///
/// Zero vectors have similarity 0 with everything; two empty vectors are
/// maximally similar.
///
/// # Errors
///
/// Returns `OmegaError::DimensionMismatch` if the vectors have different dimensions.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    let dot = dot_product(a, b)?;
    if a.is_empty() {
        return Ok(1.0);
    }

    let norm_a = magnitude(a);
    let norm_b = magnitude(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    Ok((dot / (norm_a * norm_b)).clamp(-1.0, 1.0))
}

/// Normalizes a vector to unit length in place.
///
/// Zero and empty vectors are left unchanged.
///
/// ```
/// use omega_core::vector::ops::normalize;
///
/// let mut v = vec![3.0, 4.0];
/// normalize(&mut v);
/// assert!((v[0] - 0.6).abs() < 1e-6);
/// assert!((v[1] - 0.8).abs() < 1e-6);
/// ```
#[inline]
pub fn normalize(vector: &mut [f32]) {
    let norm = magnitude(vector);
    if norm == 0.0 {
        return;
    }

    let inv_norm = 1.0 / norm;
    for x in vector.iter_mut() {
        *x *= inv_norm;
    }
}

/// Returns the L2 norm of a vector
#[inline(always)]
pub fn magnitude(vector: &[f32]) -> f32 {
    vector.iter().map(|x| x * x).sum::<f32>().sqrt()
}
