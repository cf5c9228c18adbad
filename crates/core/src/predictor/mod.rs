//! Learned early-stop predictor
//!
//! A [`PredictorModel`] is loaded once per index and hands out one
//! [`PredictorSession`] per query. The session watches the search (hops
//! and visited neighbors) and may tell the search loop to stop before the
//! standard convergence rule fires.
//!
//! The decision is split in two so that expensive inference can be
//! amortized over many hops:
//!
//! - [`PredictorSession::should_predict`] is a cheap gate, asked every
//!   iteration
//! - [`PredictorSession::should_stop`] runs the model, and is only asked
//!   when the gate is open
//!
//! The target recall is an input to the model, not a promise: a session
//! may stop early and return fewer true neighbors than requested.
//!
//! Sessions are boxed and owned by a single query; dropping the box
//! releases the session on every exit path.

mod model;
mod session;

pub use model::{
    CalibrationPoint, LearnedStopModel, ModelArtifact, FEATURE_COUNT, MODEL_FILE_NAME, MODEL_VERSION,
};
pub use session::LearnedStopSession;

use crate::{NodeId, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Per-query session parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionParams {
    /// Recall the session aims for, in (0, 1]
    pub target_recall: f32,
    /// Requested number of results
    pub k: u32,
    /// Number of recent visits used for smoothing
    pub window_size: u32,
}

/// Cumulative session counters, for observability only
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Frontier pops reported
    pub hops: u64,
    /// Neighbor visits reported
    pub comparisons: u64,
    /// Estimated number of true top-k neighbors already collected
    pub estimated_ground_truth: u64,
}

/// One early-stop decision context, owned by a single query
pub trait PredictorSession {
    /// Seed the session with the distance of the base-layer entry node
    fn set_dist_start(&mut self, distance: f32);

    /// A neighbor was evaluated; `accepted` tells whether it entered the
    /// result set
    fn report_visit(&mut self, node: NodeId, distance: f32, accepted: bool);

    /// A candidate was popped from the frontier
    fn report_hop(&mut self);

    /// Cheap gate: should the model be consulted this iteration?
    fn should_predict(&mut self) -> bool;

    /// Model decision; only meaningful after `should_predict` returned true
    fn should_stop(&mut self) -> bool;

    /// Counters accumulated so far
    fn stats(&self) -> SessionStats;
}

/// A loaded early-stop model, shared read-only by concurrent queries
pub trait PredictorModel: Send + Sync {
    /// Load model artifacts from `dir`. On failure the model stays unloaded
    /// and may still be dropped safely.
    fn load(&mut self, dir: &Path) -> Result<()>;

    /// Whether a model has been loaded successfully
    fn is_loaded(&self) -> bool;

    /// Start a new session; `None` if the session cannot be created
    fn create_session(&self, params: SessionParams) -> Option<Box<dyn PredictorSession + '_>>;
}
