//! Proximity graph
//!
//! The search loop reads the graph only through [`ProximityGraph`]: entry
//! point, per-level adjacency and batched vector fetch. The graph is
//! immutable for the duration of any search.
//!
//! - [`HnswGraph`]: in-memory layered graph, built incrementally
//! - [`flat`]: exact brute-force scan over any [`ProximityGraph`]

pub mod flat;
pub mod hnsw;

pub use hnsw::{GraphParts, HnswGraph};

use crate::metric::Metric;
use crate::{NodeId, Result};

/// Read-only view of a layered proximity graph
pub trait ProximityGraph {
    /// Number of nodes
    fn node_count(&self) -> usize;

    /// Vector dimension
    fn dimension(&self) -> usize;

    /// Metric the graph was built with
    fn metric(&self) -> Metric;

    /// Node the search starts from, or [`crate::INVALID_NODE`] when empty
    fn entry_point(&self) -> NodeId;

    /// Highest populated level
    fn max_level(&self) -> usize;

    /// Ordered adjacency list of `node` at `level`; empty if the node does
    /// not reach that level
    fn neighbors(&self, level: usize, node: NodeId) -> &[NodeId];

    /// Append the vectors of `ids` to `out`, one per id, in order
    fn fetch_vectors<'g>(&'g self, ids: &[NodeId], out: &mut Vec<&'g [f32]>) -> Result<()>;

    /// External key of `node`
    fn key(&self, node: NodeId) -> u64;
}
