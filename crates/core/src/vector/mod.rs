//! Vector kernels
//!
//! - [`ops`]: dimension-checked scalar operations
//! - [`simd`]: runtime-dispatched SIMD kernels used on the search hot path
//!
//! ```
//! use omega_core::vector::{normalize, squared_l2_simd};
//!
//! let mut v = vec![3.0, 4.0];
//! normalize(&mut v);
//! assert!(squared_l2_simd(&v, &[0.6, 0.8]) < 1e-6);
//! ```

pub mod ops;
pub mod simd;

pub use ops::{cosine_similarity, dot_product, magnitude, normalize, squared_l2};
pub use simd::{cosine_similarity_simd, dot_product_simd, norm_simd, squared_l2_simd};
