//! Searcher with the learned early-stop overlay
//!
//! The mode is decided once, when an index is loaded. Adaptive mode needs
//! all of:
//!
//! - `omega.enabled`
//! - a graph with at least `omega.min_vector_threshold` vectors
//! - a configured `omega.model_dir` from which the model loads
//!
//! Anything else falls back to baseline search, which then behaves exactly
//! like [`HnswSearcher`]. Predictor problems are logged and absorbed; they
//! never fail a load or a query.

use super::hnsw::{GraphEngine, HnswSearcher};
use super::{invalid_state, IndexSearcher, LifecycleState, SearchMode, SearcherStats};
use crate::config::{OmegaConfig, Params, SearcherConfig};
use crate::index::{HnswGraph, ProximityGraph};
use crate::predictor::{LearnedStopModel, PredictorModel, SessionParams};
use crate::search::SearchContext;
use crate::storage::FileStorage;
use crate::{OmegaError, Result};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

/// Builds a fresh, unloaded predictor model
pub type ModelFactory = Box<dyn Fn() -> Box<dyn PredictorModel> + Send + Sync>;

enum State {
    Uninitialized,
    Configured {
        model: Box<dyn PredictorModel>,
    },
    Loaded {
        model: Box<dyn PredictorModel>,
        mode: SearchMode,
    },
}

/// HNSW searcher with an optional learned early-stop predictor
pub struct OmegaSearcher {
    engine: HnswSearcher,
    omega: OmegaConfig,
    factory: ModelFactory,
    state: State,
    adaptive_queries: AtomicU64,
}

impl fmt::Debug for OmegaSearcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OmegaSearcher")
            .field("engine", &self.engine)
            .field("omega", &self.omega)
            .field("state", &self.state())
            .field("mode", &self.mode())
            .finish()
    }
}

impl Default for OmegaSearcher {
    fn default() -> Self {
        Self::new()
    }
}

impl OmegaSearcher {
    /// Searcher using the bundled [`LearnedStopModel`]
    pub fn new() -> Self {
        Self::with_model_factory(Box::new(|| -> Box<dyn PredictorModel> {
            Box::new(LearnedStopModel::new())
        }))
    }

    /// Searcher whose predictor models come from `factory`
    pub fn with_model_factory(factory: ModelFactory) -> Self {
        Self {
            engine: HnswSearcher::new(),
            omega: OmegaConfig::default(),
            factory,
            state: State::Uninitialized,
            adaptive_queries: AtomicU64::new(0),
        }
    }

    /// Configure from already-parsed options
    pub fn configure(&mut self, config: SearcherConfig) -> Result<()> {
        if !matches!(self.state, State::Uninitialized) {
            return Err(invalid_state("omega searcher", "init", self.state()));
        }
        self.omega = config.omega.clone();
        self.engine = HnswSearcher::with_config(config);
        self.state = State::Configured {
            model: (self.factory)(),
        };
        info!(
            enabled = self.omega.enabled,
            target_recall = self.omega.target_recall,
            min_vector_threshold = self.omega.min_vector_threshold,
            model_dir = ?self.omega.model_dir,
            "omega searcher initialized"
        );
        Ok(())
    }

    pub fn state(&self) -> LifecycleState {
        match self.state {
            State::Uninitialized => LifecycleState::Uninitialized,
            State::Configured { .. } => LifecycleState::Configured,
            State::Loaded { .. } => LifecycleState::Loaded,
        }
    }

    /// Mode chosen for the loaded index; `None` when nothing is loaded
    pub fn mode(&self) -> Option<SearchMode> {
        match self.state {
            State::Loaded { mode, .. } => Some(mode),
            _ => None,
        }
    }

    pub fn omega_config(&self) -> &OmegaConfig {
        &self.omega
    }

    /// The wrapped baseline engine
    pub fn engine(&self) -> &HnswSearcher {
        &self.engine
    }

    /// Load an in-memory graph and pick the search mode for it
    pub fn load_graph(&mut self, graph: HnswGraph) -> Result<()> {
        let mut model = match std::mem::replace(&mut self.state, State::Uninitialized) {
            State::Configured { model } => model,
            other => {
                self.state = other;
                return Err(invalid_state("omega searcher", "load", self.state()));
            }
        };

        let vector_count = graph.len();
        if let Err(e) = self.engine.load_graph(graph) {
            self.state = State::Configured { model };
            return Err(e);
        }

        let mode = self.select_mode(model.as_mut(), vector_count);
        self.adaptive_queries.store(0, Ordering::Relaxed);
        self.state = State::Loaded { model, mode };
        Ok(())
    }

    fn select_mode(&self, model: &mut dyn PredictorModel, vector_count: usize) -> SearchMode {
        let omega = &self.omega;
        if !omega.enabled {
            return SearchMode::Baseline;
        }
        if vector_count < omega.min_vector_threshold as usize {
            info!(
                vector_count,
                min_vector_threshold = omega.min_vector_threshold,
                "vector count below threshold, using baseline search"
            );
            return SearchMode::Baseline;
        }
        let Some(dir) = omega.model_dir.as_deref() else {
            warn!("omega enabled but no model_dir configured, falling back to baseline search");
            return SearchMode::Baseline;
        };

        match model.load(dir) {
            Ok(()) if model.is_loaded() => {
                info!(model_dir = %dir.display(), vector_count, "adaptive search active");
                SearchMode::Adaptive
            }
            Ok(()) => {
                warn!(model_dir = %dir.display(), "model reported success but is not loaded, falling back to baseline search");
                SearchMode::Baseline
            }
            Err(e) => {
                warn!(model_dir = %dir.display(), error = %e, "failed to load model, falling back to baseline search");
                SearchMode::Baseline
            }
        }
    }

    fn loaded(&self, op: &str) -> Result<(&dyn PredictorModel, SearchMode)> {
        match &self.state {
            State::Loaded { model, mode } => Ok((model.as_ref(), *mode)),
            _ => Err(invalid_state("omega searcher", op, self.state())),
        }
    }
}

impl IndexSearcher for OmegaSearcher {
    fn init(&mut self, params: &Params) -> Result<()> {
        if !matches!(self.state, State::Uninitialized) {
            return Err(invalid_state("omega searcher", "init", self.state()));
        }
        self.configure(SearcherConfig::from_params(params)?)
    }

    fn cleanup(&mut self) -> Result<()> {
        if matches!(self.state, State::Uninitialized) {
            return Ok(());
        }
        self.state = State::Uninitialized;
        self.engine.cleanup()
    }

    fn load(&mut self, storage: &FileStorage, name: &str) -> Result<()> {
        if !matches!(self.state, State::Configured { .. }) {
            return Err(invalid_state("omega searcher", "load", self.state()));
        }
        let graph = storage.load_index(name)?;
        self.load_graph(graph)
    }

    fn unload(&mut self) -> Result<()> {
        if !matches!(self.state, State::Loaded { .. }) {
            return Ok(());
        }
        // the loaded model goes with the index; the next load starts fresh
        self.state = State::Configured {
            model: (self.factory)(),
        };
        self.engine.unload()
    }

    fn search(&self, query: &[f32], ctx: &mut dyn SearchContext) -> Result<()> {
        let (model, mode) = self.loaded("search")?;
        if mode == SearchMode::Baseline || ctx.topk() == 0 {
            return self.engine.search_with(query, ctx, None);
        }

        let Some(graph) = self.engine.graph() else {
            return Err(invalid_state("omega searcher", "search", self.state()));
        };
        if query.len() != graph.dimension() {
            return Err(OmegaError::DimensionMismatch {
                expected: graph.dimension(),
                actual: query.len(),
            });
        }

        // the result heap never holds more than every node
        let k = ctx.topk().min(graph.node_count().max(1));
        let params = SessionParams {
            target_recall: self.omega.target_recall,
            k: u32::try_from(k).unwrap_or(u32::MAX),
            window_size: self.omega.window_size,
        };
        let mut session = model.create_session(params);
        if session.is_none() {
            warn!(k = params.k, "could not create predictor session, searching without it");
        }
        let adaptive = session.is_some();
        self.engine.search_with(query, ctx, session.as_deref_mut())?;
        if adaptive {
            self.adaptive_queries.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn search_bruteforce(&self, query: &[f32], ctx: &mut dyn SearchContext) -> Result<()> {
        self.loaded("search")?;
        self.engine.search_bruteforce(query, ctx)
    }

    fn search_bruteforce_by_keys(
        &self,
        query: &[f32],
        keys: &[u64],
        ctx: &mut dyn SearchContext,
    ) -> Result<()> {
        self.loaded("search")?;
        self.engine.search_bruteforce_by_keys(query, keys, ctx)
    }

    fn stats(&self) -> SearcherStats {
        let engine = self.engine.stats();
        SearcherStats {
            state: self.state(),
            mode: self.mode().unwrap_or_default(),
            vector_count: engine.vector_count,
            queries: engine.queries,
            adaptive_queries: self.adaptive_queries.load(Ordering::Relaxed),
        }
    }
}
