//! Distance metrics
//!
//! Inside the search every metric is a *distance*: smaller is closer. What
//! callers see is a *score*, whose direction depends on the metric:
//!
//! | Metric             | Distance        | Score             | Order      |
//! |--------------------|-----------------|-------------------|------------|
//! | `SquaredEuclidean` | squared L2      | squared L2        | ascending  |
//! | `InnerProduct`     | -dot            | dot               | descending |
//! | `Cosine`           | 1 - cos         | cos               | descending |

use crate::vector::simd::{dot_product_simd, norm_simd, squared_l2_simd};
use crate::{OmegaError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Similarity measure an index is built with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Metric {
    #[default]
    SquaredEuclidean,
    InnerProduct,
    Cosine,
}

impl Metric {
    /// Internal distance between two vectors (smaller is closer)
    #[inline]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::SquaredEuclidean => squared_l2_simd(a, b),
            Metric::InnerProduct => -dot_product_simd(a, b),
            Metric::Cosine => {
                let norms = norm_simd(a) * norm_simd(b);
                if norms == 0.0 {
                    1.0
                } else {
                    1.0 - (dot_product_simd(a, b) / norms).clamp(-1.0, 1.0)
                }
            }
        }
    }

    /// Convert an internal distance into the externally reported score
    #[inline]
    pub fn score_from_distance(self, distance: f32) -> f32 {
        match self {
            Metric::SquaredEuclidean => distance,
            Metric::InnerProduct => -distance,
            Metric::Cosine => 1.0 - distance,
        }
    }

    /// True when larger scores are better
    #[inline]
    pub fn is_descending(self) -> bool {
        !matches!(self, Metric::SquaredEuclidean)
    }

    /// Whether `score` passes a radius threshold
    #[inline]
    pub fn within_threshold(self, score: f32, threshold: f32) -> bool {
        if self.is_descending() {
            score >= threshold
        } else {
            score <= threshold
        }
    }

    /// Stable on-disk identifier
    pub fn id(self) -> u8 {
        match self {
            Metric::SquaredEuclidean => 1,
            Metric::InnerProduct => 2,
            Metric::Cosine => 3,
        }
    }

    /// Inverse of [`Metric::id`]
    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            1 => Ok(Metric::SquaredEuclidean),
            2 => Ok(Metric::InnerProduct),
            3 => Ok(Metric::Cosine),
            other => Err(OmegaError::Format(format!("unknown metric id {other}"))),
        }
    }

    /// Parse a metric name as used in parameters
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "squared_euclidean" | "l2" | "euclidean" => Ok(Metric::SquaredEuclidean),
            "inner_product" | "ip" => Ok(Metric::InnerProduct),
            "cosine" => Ok(Metric::Cosine),
            other => Err(OmegaError::InvalidParameter(format!(
                "unknown metric {other:?}"
            ))),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::SquaredEuclidean => "squared_euclidean",
            Metric::InnerProduct => "inner_product",
            Metric::Cosine => "cosine",
        };
        f.write_str(name)
    }
}

/// Distance from one fixed query to graph vectors
pub trait DistanceCalculator {
    /// Dimension of the bound query
    fn dimension(&self) -> usize;

    /// Distance from the query to `vector`
    fn distance(&self, vector: &[f32]) -> f32;

    /// Distances to a batch of vectors, written to `out` in order
    fn batch_distance(&self, vectors: &[&[f32]], out: &mut Vec<f32>) {
        out.clear();
        out.extend(vectors.iter().map(|v| self.distance(v)));
    }
}

/// [`DistanceCalculator`] over the SIMD kernels
#[derive(Debug, Clone, Copy)]
pub struct QueryDistance<'q> {
    metric: Metric,
    query: &'q [f32],
    query_norm: f32,
}

impl<'q> QueryDistance<'q> {
    /// Bind a query, checking it against the index dimension
    pub fn new(metric: Metric, query: &'q [f32], dimension: usize) -> Result<Self> {
        if query.len() != dimension {
            return Err(OmegaError::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }

        let query_norm = match metric {
            Metric::Cosine => norm_simd(query),
            _ => 0.0,
        };

        Ok(Self {
            metric,
            query,
            query_norm,
        })
    }

    /// Metric the query is bound with
    pub fn metric(&self) -> Metric {
        self.metric
    }
}

impl DistanceCalculator for QueryDistance<'_> {
    fn dimension(&self) -> usize {
        self.query.len()
    }

    #[inline]
    fn distance(&self, vector: &[f32]) -> f32 {
        match self.metric {
            Metric::Cosine => {
                let norms = self.query_norm * norm_simd(vector);
                if norms == 0.0 {
                    1.0
                } else {
                    1.0 - (dot_product_simd(self.query, vector) / norms).clamp(-1.0, 1.0)
                }
            }
            metric => metric.distance(self.query, vector),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_squared_euclidean() {
        let m = Metric::SquaredEuclidean;
        assert_eq!(m.distance(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
        assert_eq!(m.score_from_distance(25.0), 25.0);
        assert!(!m.is_descending());
        assert!(m.within_threshold(25.0, 25.0));
        assert!(!m.within_threshold(25.1, 25.0));
    }

    #[test]
    fn test_inner_product() {
        let m = Metric::InnerProduct;
        let d = m.distance(&[1.0, 2.0], &[3.0, 4.0]);
        assert_eq!(d, -11.0);
        assert_eq!(m.score_from_distance(d), 11.0);
        assert!(m.is_descending());
        assert!(m.within_threshold(11.0, 10.0));
        assert!(!m.within_threshold(9.0, 10.0));
    }

    #[test]
    fn test_cosine() {
        let m = Metric::Cosine;
        let d = m.distance(&[1.0, 0.0], &[0.0, 2.0]);
        assert!((d - 1.0).abs() < 1e-6);
        assert!((m.score_from_distance(m.distance(&[1.0, 1.0], &[2.0, 2.0])) - 1.0).abs() < 1e-6);
        assert_eq!(m.distance(&[0.0, 0.0], &[1.0, 1.0]), 1.0);
    }

    #[test]
    fn test_metric_ids() {
        for m in [Metric::SquaredEuclidean, Metric::InnerProduct, Metric::Cosine] {
            assert_eq!(Metric::from_id(m.id()).unwrap(), m);
            assert_eq!(Metric::from_name(&m.to_string()).unwrap(), m);
        }
        assert!(matches!(Metric::from_id(0), Err(OmegaError::Format(_))));
        assert!(Metric::from_name("hamming").is_err());
    }

    #[test]
    fn test_query_distance_matches_metric() {
        let query = [0.5, -1.0, 2.0];
        let other = [1.0, 1.0, 1.0];
        for m in [Metric::SquaredEuclidean, Metric::InnerProduct, Metric::Cosine] {
            let calc = QueryDistance::new(m, &query, 3).unwrap();
            assert!((calc.distance(&other) - m.distance(&query, &other)).abs() < 1e-6);
        }
    }

    #[test]
    fn test_query_distance_batch() {
        let calc = QueryDistance::new(Metric::SquaredEuclidean, &[0.0, 0.0], 2).unwrap();
        let a = [1.0, 0.0];
        let b = [0.0, 2.0];
        let mut out = vec![99.0];
        calc.batch_distance(&[&a, &b], &mut out);
        assert_eq!(out, vec![1.0, 4.0]);
    }

    #[test]
    fn test_query_distance_dimension_check() {
        assert!(matches!(
            QueryDistance::new(Metric::SquaredEuclidean, &[1.0, 2.0], 3),
            Err(OmegaError::DimensionMismatch { expected: 3, actual: 2 })
        ));
    }
}
