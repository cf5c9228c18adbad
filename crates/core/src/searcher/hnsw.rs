//! Baseline HNSW searcher

use super::{invalid_state, IndexSearcher, LifecycleState, SearchMode, SearcherStats};
use crate::config::{Params, SearcherConfig};
use crate::index::{flat, HnswGraph, ProximityGraph};
use crate::metric::QueryDistance;
use crate::predictor::PredictorSession;
use crate::search::{search_graph, SearchContext};
use crate::storage::FileStorage;
use crate::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// What a composing searcher may use from the engine it wraps
///
/// Wrappers reach the loaded graph and the search loop through this
/// interface, never through the engine's lifecycle internals.
pub trait GraphEngine {
    /// The loaded graph, if any
    fn graph(&self) -> Option<&HnswGraph>;

    /// Search width used when the context sets none
    fn default_ef(&self) -> usize;

    /// Run one query, optionally with a predictor session attached
    fn search_with(
        &self,
        query: &[f32],
        ctx: &mut dyn SearchContext,
        session: Option<&mut (dyn PredictorSession + '_)>,
    ) -> Result<()>;
}

#[derive(Debug)]
enum State {
    Uninitialized,
    Configured,
    Loaded(HnswGraph),
}

/// Plain layered graph searcher
#[derive(Debug)]
pub struct HnswSearcher {
    config: SearcherConfig,
    state: State,
    queries: AtomicU64,
}

impl Default for HnswSearcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HnswSearcher {
    pub fn new() -> Self {
        Self {
            config: SearcherConfig::default(),
            state: State::Uninitialized,
            queries: AtomicU64::new(0),
        }
    }

    /// Configured searcher, skipping parameter parsing
    pub fn with_config(config: SearcherConfig) -> Self {
        Self {
            config,
            state: State::Configured,
            queries: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &SearcherConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        match self.state {
            State::Uninitialized => LifecycleState::Uninitialized,
            State::Configured => LifecycleState::Configured,
            State::Loaded(_) => LifecycleState::Loaded,
        }
    }

    /// Load an in-memory graph, as [`IndexSearcher::load`] does for a stored one
    pub fn load_graph(&mut self, graph: HnswGraph) -> Result<()> {
        if !matches!(self.state, State::Configured) {
            return Err(invalid_state("hnsw searcher", "load", self.state()));
        }
        info!(
            vectors = graph.len(),
            dimension = graph.dimension(),
            metric = %graph.metric(),
            ef_search = self.config.ef_search,
            "index loaded"
        );
        self.queries.store(0, Ordering::Relaxed);
        self.state = State::Loaded(graph);
        Ok(())
    }

    fn loaded(&self, op: &str) -> Result<&HnswGraph> {
        match &self.state {
            State::Loaded(graph) => Ok(graph),
            _ => Err(invalid_state("hnsw searcher", op, self.state())),
        }
    }

    fn scan(
        &self,
        query: &[f32],
        keys: Option<&[u64]>,
        ctx: &mut dyn SearchContext,
    ) -> Result<()> {
        let graph = self.loaded("search")?;
        let dist = QueryDistance::new(graph.metric(), query, graph.dimension())?;
        flat::scan(graph, &dist, ctx, keys)
    }
}

impl GraphEngine for HnswSearcher {
    fn graph(&self) -> Option<&HnswGraph> {
        match &self.state {
            State::Loaded(graph) => Some(graph),
            _ => None,
        }
    }

    fn default_ef(&self) -> usize {
        self.config.ef_search
    }

    fn search_with(
        &self,
        query: &[f32],
        ctx: &mut dyn SearchContext,
        session: Option<&mut (dyn PredictorSession + '_)>,
    ) -> Result<()> {
        let graph = self.loaded("search")?;
        let dist = QueryDistance::new(graph.metric(), query, graph.dimension())?;
        self.queries.fetch_add(1, Ordering::Relaxed);
        search_graph(graph, &dist, ctx, self.config.ef_search, session)
    }
}

impl IndexSearcher for HnswSearcher {
    fn init(&mut self, params: &Params) -> Result<()> {
        if !matches!(self.state, State::Uninitialized) {
            return Err(invalid_state("hnsw searcher", "init", self.state()));
        }
        self.config = SearcherConfig::from_params(params)?;
        self.state = State::Configured;
        Ok(())
    }

    fn cleanup(&mut self) -> Result<()> {
        self.state = State::Uninitialized;
        self.config = SearcherConfig::default();
        Ok(())
    }

    fn load(&mut self, storage: &FileStorage, name: &str) -> Result<()> {
        if !matches!(self.state, State::Configured) {
            return Err(invalid_state("hnsw searcher", "load", self.state()));
        }
        let graph = storage.load_index(name)?;
        self.load_graph(graph)
    }

    fn unload(&mut self) -> Result<()> {
        if matches!(self.state, State::Loaded(_)) {
            self.state = State::Configured;
        }
        Ok(())
    }

    fn search(&self, query: &[f32], ctx: &mut dyn SearchContext) -> Result<()> {
        self.search_with(query, ctx, None)
    }

    fn search_bruteforce(&self, query: &[f32], ctx: &mut dyn SearchContext) -> Result<()> {
        self.scan(query, None, ctx)
    }

    fn search_bruteforce_by_keys(
        &self,
        query: &[f32],
        keys: &[u64],
        ctx: &mut dyn SearchContext,
    ) -> Result<()> {
        self.scan(query, Some(keys), ctx)
    }

    fn stats(&self) -> SearcherStats {
        SearcherStats {
            state: self.state(),
            mode: SearchMode::Baseline,
            vector_count: self.graph().map_or(0, HnswGraph::len),
            queries: self.queries.load(Ordering::Relaxed),
            adaptive_queries: 0,
        }
    }
}
