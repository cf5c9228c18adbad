//! Searchers: lifecycle wrappers around a loaded graph
//!
//! A searcher goes through
//!
//! ```text
//! Uninitialized --init--> Configured --load--> Loaded
//!       ^                   ^    |               |
//!       |                   |    +---unload------+
//!       +------cleanup------+--------------------+
//! ```
//!
//! [`HnswSearcher`] is the baseline engine. [`OmegaSearcher`] composes it
//! through the [`GraphEngine`] interface and adds the learned early-stop
//! overlay, active only when [`SearchMode::Adaptive`] was selected at load.

mod hnsw;
mod omega;

pub use hnsw::{GraphEngine, HnswSearcher};
pub use omega::{ModelFactory, OmegaSearcher};

use crate::config::Params;
use crate::search::{HnswContext, SearchContext};
use crate::storage::FileStorage;
use crate::{OmegaError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::error;

/// Lifecycle position of a searcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    Uninitialized,
    Configured,
    Loaded,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Configured => "configured",
            LifecycleState::Loaded => "loaded",
        };
        f.write_str(name)
    }
}

/// How queries are answered for the currently loaded index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SearchMode {
    /// Plain layered graph search
    #[default]
    Baseline,
    /// Graph search with the learned early-stop predictor attached
    Adaptive,
}

/// Searcher counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearcherStats {
    pub state: LifecycleState,
    pub mode: SearchMode,
    /// Vectors in the loaded graph, 0 when nothing is loaded
    pub vector_count: usize,
    /// Queries answered since the last load
    pub queries: u64,
    /// Of those, queries that ran with a predictor session
    pub adaptive_queries: u64,
}

/// Common lifecycle and query interface of searchers
pub trait IndexSearcher {
    /// Read options and move to [`LifecycleState::Configured`]
    fn init(&mut self, params: &Params) -> Result<()>;

    /// Release everything and go back to [`LifecycleState::Uninitialized`]
    fn cleanup(&mut self) -> Result<()>;

    /// Load the index stored as `name`
    fn load(&mut self, storage: &FileStorage, name: &str) -> Result<()>;

    /// Drop the loaded index, keeping the configuration
    fn unload(&mut self) -> Result<()>;

    /// Fresh context with the default result count
    fn create_context(&self) -> HnswContext {
        HnswContext::default()
    }

    /// Approximate top-k search; the result is published into `ctx`
    fn search(&self, query: &[f32], ctx: &mut dyn SearchContext) -> Result<()>;

    /// Exact top-k over every vector
    fn search_bruteforce(&self, query: &[f32], ctx: &mut dyn SearchContext) -> Result<()>;

    /// Exact top-k restricted to the listed keys
    fn search_bruteforce_by_keys(
        &self,
        query: &[f32],
        keys: &[u64],
        ctx: &mut dyn SearchContext,
    ) -> Result<()>;

    fn stats(&self) -> SearcherStats;
}

/// Log and build the error for an out-of-sequence call
pub(crate) fn invalid_state(component: &str, op: &str, state: LifecycleState) -> OmegaError {
    error!(component, op, %state, "operation not allowed in this state");
    OmegaError::InvalidState(format!("{component}: cannot {op} while {state}"))
}
