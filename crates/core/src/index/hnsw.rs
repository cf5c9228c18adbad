//! HNSW (Hierarchical Navigable Small World) graph
//!
//! Based on the paper "Efficient and robust approximate nearest neighbor search using
//! Hierarchical Navigable Small World graphs" by Malkov & Yashunin (2018).
//!
//! The graph is a set of layers:
//! - Layer 0 contains all nodes
//! - Higher layers contain exponentially fewer nodes
//! - Each node links to its nearest neighbors at each layer it reaches
//!
//! Adjacency lists are plain ordered vectors so that two graphs built from the
//! same input with the same seed are identical, and searches over them visit
//! nodes in the same order.

use super::ProximityGraph;
use crate::config::HnswConfig;
use crate::metric::{Metric, QueryDistance};
use crate::search::heap::{Candidate, CandidateFrontier, ResultHeap};
use crate::search::visited::VisitedFilter;
use crate::search::{search_graph, HnswContext};
use crate::{Neighbor, NodeId, OmegaError, Result, INVALID_NODE};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Highest level a node can be assigned
pub const MAX_LEVEL: usize = 16;

/// Raw contents of a graph, as stored on disk
#[derive(Debug, Clone, PartialEq)]
pub struct GraphParts {
    pub dimension: usize,
    pub metric: Metric,
    pub config: HnswConfig,
    pub keys: Vec<u64>,
    /// Node-major, `keys.len() * dimension` values
    pub vectors: Vec<f32>,
    /// `links[node][level]` is the adjacency list of `node` at `level`
    pub links: Vec<Vec<Vec<NodeId>>>,
    pub entry_point: NodeId,
    pub max_level: usize,
}

/// In-memory HNSW graph
#[derive(Debug, Clone)]
pub struct HnswGraph {
    dimension: usize,
    metric: Metric,
    config: HnswConfig,
    keys: Vec<u64>,
    vectors: Vec<f32>,
    links: Vec<Vec<Vec<NodeId>>>,
    entry_point: NodeId,
    max_level: usize,
    rng: StdRng,
}

impl HnswGraph {
    /// Creates an empty graph
    ///
    /// # Arguments
    /// * `dimension` - Dimensionality of vectors
    /// * `metric` - Distance metric used for construction and search
    /// * `config` - HNSW construction parameters
    pub fn new(dimension: usize, metric: Metric, config: HnswConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            dimension,
            metric,
            config,
            keys: Vec::new(),
            vectors: Vec::new(),
            links: Vec::new(),
            entry_point: INVALID_NODE,
            max_level: 0,
            rng,
        }
    }

    /// Creates an empty squared-Euclidean graph with default configuration
    pub fn with_defaults(dimension: usize) -> Self {
        Self::new(dimension, Metric::SquaredEuclidean, HnswConfig::default())
    }

    /// Rebuild a graph from stored parts, checking their consistency
    pub fn from_parts(parts: GraphParts) -> Result<Self> {
        let count = parts.keys.len();
        if parts.vectors.len() != count * parts.dimension {
            return Err(OmegaError::Format(format!(
                "expected {} vector values, found {}",
                count * parts.dimension,
                parts.vectors.len()
            )));
        }
        if parts.links.len() != count {
            return Err(OmegaError::Format(format!(
                "expected {count} adjacency entries, found {}",
                parts.links.len()
            )));
        }
        if count == 0 {
            if parts.entry_point != INVALID_NODE {
                return Err(OmegaError::Format(
                    "empty graph with an entry point".to_string(),
                ));
            }
        } else {
            let entry_levels = parts
                .links
                .get(parts.entry_point as usize)
                .map(Vec::len)
                .ok_or_else(|| {
                    OmegaError::Format(format!("entry point {} out of range", parts.entry_point))
                })?;
            if entry_levels != parts.max_level + 1 {
                return Err(OmegaError::Format(format!(
                    "entry point reaches level {}, graph max level is {}",
                    entry_levels.saturating_sub(1),
                    parts.max_level
                )));
            }
        }
        for (node, levels) in parts.links.iter().enumerate() {
            if levels.is_empty() || levels.len() > parts.max_level + 1 {
                return Err(OmegaError::Format(format!(
                    "node {node} has {} levels",
                    levels.len()
                )));
            }
            if levels.iter().flatten().any(|&n| n as usize >= count) {
                return Err(OmegaError::Format(format!(
                    "node {node} links to a node out of range"
                )));
            }
        }

        let mut graph = Self::new(parts.dimension, parts.metric, parts.config);
        graph.keys = parts.keys;
        graph.vectors = parts.vectors;
        graph.links = parts.links;
        graph.entry_point = parts.entry_point;
        graph.max_level = parts.max_level;
        Ok(graph)
    }

    /// Copy the graph out into its stored parts
    pub fn to_parts(&self) -> GraphParts {
        GraphParts {
            dimension: self.dimension,
            metric: self.metric,
            config: self.config.clone(),
            keys: self.keys.clone(),
            vectors: self.vectors.clone(),
            links: self.links.clone(),
            entry_point: self.entry_point,
            max_level: self.max_level,
        }
    }

    /// Adds a vector under `key` and links it into the graph
    ///
    /// # Errors
    /// Returns error if the vector dimension doesn't match the graph dimension
    pub fn insert(&mut self, key: u64, vector: &[f32]) -> Result<NodeId> {
        if vector.len() != self.dimension {
            return Err(OmegaError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        let node = NodeId::try_from(self.keys.len())
            .ok()
            .filter(|&n| n != INVALID_NODE)
            .ok_or_else(|| OmegaError::InvalidState("graph is full".to_string()))?;

        let level = self.random_level();
        self.keys.push(key);
        self.vectors.extend_from_slice(vector);
        self.links.push(vec![Vec::new(); level + 1]);

        if self.entry_point == INVALID_NODE {
            self.entry_point = node;
            self.max_level = level;
            return Ok(node);
        }

        self.insert_node(node, level);

        if level > self.max_level {
            self.max_level = level;
            self.entry_point = node;
        }

        Ok(node)
    }

    /// Searches for the `k` nearest neighbors with the configured `ef_search`
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let dist = QueryDistance::new(self.metric, query, self.dimension)?;
        let mut ctx = HnswContext::new(k);
        search_graph(self, &dist, &mut ctx, self.config.ef_search, None)?;
        Ok(ctx.take_result())
    }

    /// Number of nodes in the graph
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn config(&self) -> &HnswConfig {
        &self.config
    }

    /// External keys, in node order
    pub fn keys(&self) -> &[u64] {
        &self.keys
    }

    /// Vector of `node`
    pub fn vector(&self, node: NodeId) -> Option<&[f32]> {
        let start = node as usize * self.dimension;
        self.vectors.get(start..start + self.dimension)
    }

    /// Number of levels `node` reaches
    pub fn node_levels(&self, node: NodeId) -> usize {
        self.links.get(node as usize).map_or(0, Vec::len)
    }

    /// Generates a random level for a new node using exponential decay
    fn random_level(&mut self) -> usize {
        let uniform: f32 = self.rng.gen_range(f32::EPSILON..1.0);
        ((-uniform.ln() * self.config.ml).floor() as usize).min(MAX_LEVEL)
    }

    #[inline]
    fn node_vector(&self, node: NodeId) -> &[f32] {
        let start = node as usize * self.dimension;
        &self.vectors[start..start + self.dimension]
    }

    #[inline]
    fn max_links(&self, level: usize) -> usize {
        if level == 0 {
            self.config.m0
        } else {
            self.config.m
        }
    }

    /// Links a freshly pushed node into every level it reaches
    fn insert_node(&mut self, node: NodeId, node_level: usize) {
        let query = self.node_vector(node).to_vec();
        let mut nearest = vec![Candidate::new(
            self.entry_point,
            self.metric.distance(&query, self.node_vector(self.entry_point)),
        )];

        for level in (node_level + 1..=self.max_level).rev() {
            nearest = self.search_layer(&query, &nearest, 1, level);
        }

        for level in (0..=node_level.min(self.max_level)).rev() {
            nearest = self.search_layer(&query, &nearest, self.config.ef_construction, level);

            let m = self.max_links(level);
            let selected = self.select_neighbors(&query, &nearest, m, level);
            self.links[node as usize][level] = selected.clone();

            for neighbor in selected {
                let neighbor_links = &mut self.links[neighbor as usize][level];
                if neighbor_links.contains(&node) {
                    continue;
                }
                neighbor_links.push(node);

                if neighbor_links.len() > m {
                    self.prune(neighbor, level, m);
                }
            }
        }
    }

    /// Shrinks the adjacency list of `node` at `level` back to `m` links
    fn prune(&mut self, node: NodeId, level: usize, m: usize) {
        let base = self.node_vector(node).to_vec();
        let mut scored: Vec<Candidate> = self.links[node as usize][level]
            .iter()
            .map(|&n| Candidate::new(n, self.metric.distance(&base, self.node_vector(n))))
            .collect();
        scored.sort();

        let pruned = self.select_neighbors(&base, &scored, m, level);
        self.links[node as usize][level] = pruned;
    }

    /// Beam search restricted to one level, used during construction
    ///
    /// Returns up to `ef` candidates sorted by ascending distance.
    fn search_layer(
        &self,
        query: &[f32],
        entry_points: &[Candidate],
        ef: usize,
        level: usize,
    ) -> Vec<Candidate> {
        let mut visited = VisitedFilter::with_capacity(self.len());
        let mut frontier = CandidateFrontier::new();
        let mut best = ResultHeap::with_capacity(ef.max(1));

        for &entry in entry_points {
            if visited.insert(entry.node) {
                frontier.push(entry);
                best.insert(entry);
            }
        }

        while let Some(current) = frontier.pop() {
            if best.is_full() {
                if let Some(furthest) = best.worst() {
                    if current.distance > furthest.distance {
                        break;
                    }
                }
            }

            for &neighbor in self.neighbors(level, current.node) {
                if !visited.insert(neighbor) {
                    continue;
                }

                let candidate =
                    Candidate::new(neighbor, self.metric.distance(query, self.node_vector(neighbor)));
                let improves = match best.worst() {
                    Some(furthest) if best.is_full() => candidate.distance < furthest.distance,
                    _ => true,
                };
                if improves {
                    frontier.push(candidate);
                    best.insert(candidate);
                }
            }
        }

        best.drain_sorted()
    }

    /// Selects up to `m` neighbors out of `candidates` (sorted ascending)
    ///
    /// When `use_heuristic` is enabled (default), uses Algorithm 4 from the HNSW paper:
    /// a candidate is kept only if it is closer to the base point than to every
    /// neighbor already selected.
    fn select_neighbors(
        &self,
        base: &[f32],
        candidates: &[Candidate],
        m: usize,
        level: usize,
    ) -> Vec<NodeId> {
        if !self.config.use_heuristic {
            return candidates.iter().take(m).map(|c| c.node).collect();
        }

        let mut working: Vec<Candidate> = candidates.to_vec();
        if self.config.extend_candidates {
            let mut seen = VisitedFilter::with_capacity(self.len());
            for c in candidates {
                seen.insert(c.node);
            }
            for c in candidates {
                for &neighbor in self.neighbors(level, c.node) {
                    if seen.insert(neighbor) {
                        working.push(Candidate::new(
                            neighbor,
                            self.metric.distance(base, self.node_vector(neighbor)),
                        ));
                    }
                }
            }
            working.sort();
        }

        let mut selected: Vec<NodeId> = Vec::with_capacity(m);
        let mut pruned: Vec<NodeId> = Vec::new();

        for candidate in working {
            if selected.len() >= m {
                break;
            }

            let candidate_vector = self.node_vector(candidate.node);
            let dominated = selected.iter().any(|&s| {
                self.metric.distance(candidate_vector, self.node_vector(s)) < candidate.distance
            });

            if dominated {
                pruned.push(candidate.node);
            } else {
                selected.push(candidate.node);
            }
        }

        if self.config.keep_pruned_connections {
            for node in pruned {
                if selected.len() >= m {
                    break;
                }
                selected.push(node);
            }
        }

        selected
    }
}

impl ProximityGraph for HnswGraph {
    fn node_count(&self) -> usize {
        self.keys.len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn metric(&self) -> Metric {
        self.metric
    }

    fn entry_point(&self) -> NodeId {
        self.entry_point
    }

    fn max_level(&self) -> usize {
        self.max_level
    }

    #[inline]
    fn neighbors(&self, level: usize, node: NodeId) -> &[NodeId] {
        self.links
            .get(node as usize)
            .and_then(|levels| levels.get(level))
            .map_or(&[], Vec::as_slice)
    }

    fn fetch_vectors<'g>(&'g self, ids: &[NodeId], out: &mut Vec<&'g [f32]>) -> Result<()> {
        for &id in ids {
            let vector = self.vector(id).ok_or_else(|| OmegaError::VectorFetch {
                node: id,
                reason: format!("node out of range (graph has {} nodes)", self.len()),
            })?;
            out.push(vector);
        }
        Ok(())
    }

    #[inline]
    fn key(&self, node: NodeId) -> u64 {
        self.keys[node as usize]
    }
}
