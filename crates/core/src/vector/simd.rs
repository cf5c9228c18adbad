//! SIMD-accelerated distance kernels
//!
//! Implementations use the `pulp` crate for portable SIMD with runtime CPU
//! detection (AVX2/SSE on x86_64, NEON on ARM, scalar elsewhere).
//!
//! ```
//! use omega_core::vector::simd::{dot_product_simd, squared_l2_simd};
//!
//! let a = vec![1.0; 16];
//! let b = vec![2.0; 16];
//!
//! assert!((dot_product_simd(&a, &b) - 32.0).abs() < 1e-5);
//! assert!((squared_l2_simd(&a, &b) - 16.0).abs() < 1e-5);
//! ```

use pulp::Simd;

/// Computes the dot product using SIMD acceleration.
///
/// # Panics
///
/// Panics if vectors have different lengths.
///
/// # Examples
///
/// ```
/// use omega_core::vector::simd::dot_product_simd;
///
/// let a = vec![1.0, 2.0, 3.0];
/// let b = vec![4.0, 5.0, 6.0];
/// assert!((dot_product_simd(&a, &b) - 32.0).abs() < 1e-5);
/// ```
#[inline]
pub fn dot_product_simd(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    let simd = pulp::Arch::new();
    simd.dispatch(DotProduct { a, b })
}

/// Computes the squared Euclidean distance using SIMD acceleration.
///
/// Calculates: sum((a[i] - b[i])^2). No square root is taken; ordering is
/// the same as for the true L2 distance.
///
/// # Panics
///
/// Panics if vectors have different lengths.
///
/// # Examples
///
/// ```
/// use omega_core::vector::simd::squared_l2_simd;
///
/// let a = vec![0.0, 0.0];
/// let b = vec![3.0, 4.0];
/// assert!((squared_l2_simd(&a, &b) - 25.0).abs() < 1e-5);
/// ```
#[inline]
pub fn squared_l2_simd(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    let simd = pulp::Arch::new();
    simd.dispatch(SquaredL2 { a, b })
}

/// Computes the L2 norm of a vector using SIMD acceleration.
#[inline]
pub fn norm_simd(vector: &[f32]) -> f32 {
    let simd = pulp::Arch::new();
    simd.dispatch(DotProduct {
        a: vector,
        b: vector,
    })
    .sqrt()
}

/// Computes cosine similarity using SIMD acceleration.
///
/// Returns a value in [-1, 1]. A zero vector has similarity 0 with
/// everything.
///
/// # Panics
///
/// Panics if vectors have different lengths.
#[inline]
pub fn cosine_similarity_simd(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    if a.is_empty() {
        return 1.0;
    }

    let simd = pulp::Arch::new();
    simd.dispatch(|| {
        let dot = simd.dispatch(DotProduct { a, b });
        let norm_a = simd.dispatch(DotProduct { a, b: a }).sqrt();
        let norm_b = simd.dispatch(DotProduct { a: b, b }).sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
    })
}

struct DotProduct<'a> {
    a: &'a [f32],
    b: &'a [f32],
}

impl pulp::WithSimd for DotProduct<'_> {
    type Output = f32;

    #[inline(always)]
    fn with_simd<S: Simd>(self, simd: S) -> Self::Output {
        let a = self.a;
        let b = self.b;
        let n = a.len();

        // 4 for SSE/NEON, 8 for AVX2
        let lane_count = std::mem::size_of::<S::f32s>() / std::mem::size_of::<f32>();
        let simd_end = n - n % lane_count;

        let mut sum = simd.f32s_splat(0.0);

        let mut i = 0;
        while i < simd_end {
            let a_vec = pulp::cast_lossy::<_, S::f32s>(simd.f32s_partial_load(&a[i..]));
            let b_vec = pulp::cast_lossy::<_, S::f32s>(simd.f32s_partial_load(&b[i..]));
            sum = simd.f32s_mul_add_e(a_vec, b_vec, sum);
            i += lane_count;
        }

        let mut result = simd.f32s_reduce_sum(sum);
        for i in simd_end..n {
            result += a[i] * b[i];
        }

        result
    }
}

struct SquaredL2<'a> {
    a: &'a [f32],
    b: &'a [f32],
}

impl pulp::WithSimd for SquaredL2<'_> {
    type Output = f32;

    #[inline(always)]
    fn with_simd<S: Simd>(self, simd: S) -> Self::Output {
        let a = self.a;
        let b = self.b;
        let n = a.len();

        let lane_count = std::mem::size_of::<S::f32s>() / std::mem::size_of::<f32>();
        let simd_end = n - n % lane_count;

        let mut sum_squares = simd.f32s_splat(0.0);

        let mut i = 0;
        while i < simd_end {
            let a_vec = pulp::cast_lossy::<_, S::f32s>(simd.f32s_partial_load(&a[i..]));
            let b_vec = pulp::cast_lossy::<_, S::f32s>(simd.f32s_partial_load(&b[i..]));
            let diff = simd.f32s_sub(a_vec, b_vec);
            sum_squares = simd.f32s_mul_add_e(diff, diff, sum_squares);
            i += lane_count;
        }

        let mut result = simd.f32s_reduce_sum(sum_squares);
        for i in simd_end..n {
            let diff = a[i] - b[i];
            result += diff * diff;
        }

        result
    }
}
