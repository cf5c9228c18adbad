//! Index construction lifecycle
//!
//! ```text
//! Init --init--> Inited --train--> Trained --build--> Built --dump--> (file)
//! ```
//!
//! [`HnswBuilder`] builds an [`crate::HnswGraph`]. [`OmegaBuilder`] wraps
//! it through the same [`IndexBuilder`] interface; the predictor model is
//! trained offline, so the graph it searches is an ordinary HNSW graph.

mod hnsw;
mod omega;

pub use hnsw::HnswBuilder;
pub use omega::OmegaBuilder;

use crate::config::Params;
use crate::metric::Metric;
use crate::storage::FileStorage;
use crate::{OmegaError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::error;

/// Shape of the vectors an index is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub dimension: usize,
    pub metric: Metric,
}

impl IndexMeta {
    pub fn new(dimension: usize, metric: Metric) -> Self {
        Self { dimension, metric }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(OmegaError::InvalidParameter(
                "index dimension must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Ordered (key, vector) input for a build
#[derive(Debug, Clone, Default)]
pub struct VectorHolder {
    dimension: usize,
    keys: Vec<u64>,
    vectors: Vec<f32>,
}

impl VectorHolder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            keys: Vec::new(),
            vectors: Vec::new(),
        }
    }

    /// Holder filled from `pairs`; every vector must have `dimension` values
    pub fn from_pairs<I, V>(dimension: usize, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (u64, V)>,
        V: AsRef<[f32]>,
    {
        let mut holder = Self::new(dimension);
        for (key, vector) in pairs {
            holder.push(key, vector.as_ref())?;
        }
        Ok(holder)
    }

    pub fn push(&mut self, key: u64, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(OmegaError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        self.keys.push(key);
        self.vectors.extend_from_slice(vector);
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (u64, &[f32])> + '_ {
        self.keys
            .iter()
            .copied()
            .zip(self.vectors.chunks_exact(self.dimension.max(1)))
    }
}

/// Builder lifecycle position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BuildState {
    #[default]
    Init,
    Inited,
    Trained,
    Built,
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildState::Init => "init",
            BuildState::Inited => "inited",
            BuildState::Trained => "trained",
            BuildState::Built => "built",
        };
        f.write_str(name)
    }
}

/// Counters and timings of the last build
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderStats {
    pub trained_count: usize,
    pub built_count: usize,
    pub dumped_count: usize,
    pub trained_ms: u64,
    pub built_ms: u64,
    pub dumped_ms: u64,
}

/// Common interface of index builders
pub trait IndexBuilder {
    /// Read options for an index of shape `meta`
    fn init(&mut self, meta: &IndexMeta, params: &Params) -> Result<()>;

    /// Inspect the input before building
    fn train(&mut self, holder: &VectorHolder) -> Result<()>;

    /// Build the index from `holder`
    fn build(&mut self, holder: &VectorHolder) -> Result<()>;

    /// Write the built index into `storage` as `name`
    fn dump(&mut self, storage: &FileStorage, name: &str) -> Result<()>;

    /// Drop everything and return to [`BuildState::Init`]
    fn cleanup(&mut self) -> Result<()>;

    fn state(&self) -> BuildState;

    fn stats(&self) -> BuilderStats;
}

pub(crate) fn out_of_sequence(component: &str, op: &str, state: BuildState) -> OmegaError {
    error!(component, op, %state, "build step called out of sequence");
    OmegaError::InvalidState(format!("{component}: cannot {op} while {state}"))
}
