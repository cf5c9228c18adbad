//! Omega - Core library
//!
//! Approximate nearest-neighbor search over a layered proximity graph (HNSW),
//! with an optional learned early-stop predictor that trades a bounded amount
//! of recall for lower search latency.
//!
//! The pieces, leaves first:
//!
//! - [`index`]: the proximity graph and an exact flat scan
//! - [`search`]: visited filter, heaps, layered navigation and base-layer expansion
//! - [`predictor`]: early-stop model and per-query decision sessions
//! - [`searcher`]: baseline and adaptive searchers with their lifecycle
//! - [`builder`]: index construction lifecycle
//! - [`storage`]: versioned on-disk format and file storage

pub mod builder;
pub mod config;
pub mod index;
pub mod metric;
pub mod predictor;
pub mod search;
pub mod searcher;
pub mod storage;
pub mod vector;

use thiserror::Error;

/// Result type for index operations
pub type Result<T> = std::result::Result<T, OmegaError>;

/// Error types for index operations
#[derive(Debug, Error)]
pub enum OmegaError {
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Vector fetch failed for node {node}: {reason}")]
    VectorFetch { node: u32, reason: String },

    #[error("Index format error: {0}")]
    Format(String),

    #[error("Predictor error: {0}")]
    Predictor(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] bincode::Error),

    #[error("Compression error: {0}")]
    CompressionError(#[from] storage::compression::CompressionError),
}

/// Position of a vector inside the graph
pub type NodeId = u32;

/// Reserved node identifier meaning "no node"
pub const INVALID_NODE: NodeId = NodeId::MAX;

/// One retained neighbor, as handed back to callers
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Neighbor {
    /// External key the vector was indexed under
    pub key: u64,
    /// Metric score (direction depends on the metric)
    pub score: f32,
}

pub use builder::{HnswBuilder, IndexBuilder, IndexMeta, OmegaBuilder, VectorHolder};
pub use config::{HnswConfig, OmegaConfig, Params, SearcherConfig};
pub use index::{HnswGraph, ProximityGraph};
pub use metric::{DistanceCalculator, Metric, QueryDistance};
pub use predictor::{LearnedStopModel, PredictorModel, PredictorSession, SessionParams, SessionStats};
pub use search::{HnswContext, SearchContext, SearchStats};
pub use searcher::{
    GraphEngine, HnswSearcher, IndexSearcher, LifecycleState, OmegaSearcher, SearchMode,
    SearcherStats,
};
pub use storage::FileStorage;
