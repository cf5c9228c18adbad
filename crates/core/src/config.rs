//! Configuration for builders and searchers
//!
//! Options arrive as a flat bag of dotted keys (`omega.enabled`,
//! `hnsw.ef_search`, ...) and are turned into typed configuration structs.
//! Unknown keys are ignored; a known key holding a value of the wrong type
//! is rejected.
//!
//! # Examples
//!
//! ```
//! use omega_core::config::{OmegaConfig, Params};
//!
//! let mut params = Params::new();
//! params.insert("omega.enabled", true);
//! params.insert("omega.target_recall", 0.9f32);
//!
//! let config = OmegaConfig::from_params(&params).unwrap();
//! assert!(config.enabled);
//! assert!((config.target_recall - 0.9).abs() < 1e-6);
//! ```

use crate::{OmegaError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// String-keyed option bag
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Params {
    values: BTreeMap<String, Value>,
}

impl Params {
    /// Create an empty option bag
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an option
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Returns true if the option is present
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Get a boolean option, falling back to `default` when absent
    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.values.get(key) {
            None => Ok(default),
            Some(value) => value
                .as_bool()
                .ok_or_else(|| wrong_type(key, "a boolean", value)),
        }
    }

    /// Get a float option, falling back to `default` when absent
    pub fn get_f32(&self, key: &str, default: f32) -> Result<f32> {
        match self.values.get(key) {
            None => Ok(default),
            Some(value) => value
                .as_f64()
                .map(|v| v as f32)
                .ok_or_else(|| wrong_type(key, "a number", value)),
        }
    }

    /// Get an unsigned 32-bit option, falling back to `default` when absent
    pub fn get_u32(&self, key: &str, default: u32) -> Result<u32> {
        match self.values.get(key) {
            None => Ok(default),
            Some(value) => value
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| wrong_type(key, "an unsigned 32-bit integer", value)),
        }
    }

    /// Get an optional unsigned 64-bit option
    pub fn get_u64(&self, key: &str) -> Result<Option<u64>> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_u64()
                .map(Some)
                .ok_or_else(|| wrong_type(key, "an unsigned integer", value)),
        }
    }

    /// Get a string option, falling back to `default` when absent
    pub fn get_string(&self, key: &str, default: &str) -> Result<String> {
        match self.values.get(key) {
            None => Ok(default.to_string()),
            Some(value) => value
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| wrong_type(key, "a string", value)),
        }
    }
}

fn wrong_type(key: &str, expected: &str, found: &Value) -> OmegaError {
    OmegaError::InvalidParameter(format!("{key} must be {expected}, got {found}"))
}

/// Configuration for HNSW graph construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HnswConfig {
    /// Number of bidirectional links created for each element (except layer 0)
    /// Typical value: 16. Higher values increase recall but use more memory.
    pub m: usize,

    /// Number of bidirectional links created for each element in layer 0
    /// Typical value: 2 * m (32 for m=16)
    pub m0: usize,

    /// Size of the dynamic candidate list during construction
    pub ef_construction: usize,

    /// Default search width stored alongside the graph
    pub ef_search: usize,

    /// Normalization factor for level generation, 1 / ln(m)
    pub ml: f32,

    /// Use the diversity heuristic (Algorithm 4 of the HNSW paper) when
    /// selecting neighbors.
    pub use_heuristic: bool,

    /// When using heuristic, also consider neighbors of candidates
    pub extend_candidates: bool,

    /// Back-fill pruned connections when the heuristic selects fewer than M
    pub keep_pruned_connections: bool,

    /// Seed for level assignment; `None` draws from entropy
    pub seed: Option<u64>,
}

impl Default for HnswConfig {
    fn default() -> Self {
        let m = 16;
        Self {
            m,
            m0: m * 2,
            ef_construction: 200,
            ef_search: 50,
            ml: 1.0 / (m as f32).ln(),
            use_heuristic: true,
            extend_candidates: false,
            keep_pruned_connections: true,
            seed: None,
        }
    }
}

impl HnswConfig {
    /// Read `hnsw.*` options on top of the defaults
    pub fn from_params(params: &Params) -> Result<Self> {
        let defaults = Self::default();
        let m = params.get_u32("hnsw.m", defaults.m as u32)? as usize;
        if m < 2 {
            return Err(OmegaError::InvalidParameter(format!(
                "hnsw.m must be at least 2, got {m}"
            )));
        }

        let m0 = params.get_u32("hnsw.m0", (m * 2) as u32)? as usize;
        let ef_construction =
            params.get_u32("hnsw.ef_construction", defaults.ef_construction as u32)? as usize;
        let ef_search = params.get_u32("hnsw.ef_search", defaults.ef_search as u32)? as usize;
        if m0 < m || ef_construction == 0 || ef_search == 0 {
            return Err(OmegaError::InvalidParameter(format!(
                "invalid graph parameters: m={m}, m0={m0}, ef_construction={ef_construction}, ef_search={ef_search}"
            )));
        }

        Ok(Self {
            m,
            m0,
            ef_construction,
            ef_search,
            ml: 1.0 / (m as f32).ln(),
            use_heuristic: params.get_bool("hnsw.use_heuristic", defaults.use_heuristic)?,
            extend_candidates: params
                .get_bool("hnsw.extend_candidates", defaults.extend_candidates)?,
            keep_pruned_connections: params.get_bool(
                "hnsw.keep_pruned_connections",
                defaults.keep_pruned_connections,
            )?,
            seed: params.get_u64("hnsw.seed")?,
        })
    }

    /// Use simple nearest-neighbor selection (faster construction, lower recall)
    pub fn with_simple_selection(mut self) -> Self {
        self.use_heuristic = false;
        self
    }

    /// Enable extended candidate search (better quality, slower construction)
    pub fn with_extended_candidates(mut self) -> Self {
        self.extend_candidates = true;
        self
    }

    /// Set ef_search parameter
    pub fn with_ef_search(mut self, ef: usize) -> Self {
        self.ef_search = ef;
        self
    }

    /// Set ef_construction parameter
    pub fn with_ef_construction(mut self, ef: usize) -> Self {
        self.ef_construction = ef;
        self
    }

    /// Set M parameter (connections per node)
    pub fn with_m(mut self, m: usize) -> Self {
        self.m = m;
        self.m0 = m * 2;
        self.ml = 1.0 / (m as f32).ln();
        self
    }

    /// Fix the level-assignment seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Options of the learned early-stop overlay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OmegaConfig {
    /// Master switch for adaptive mode
    pub enabled: bool,
    /// Recall the predictor aims for; best effort, never guaranteed
    pub target_recall: f32,
    /// Graphs smaller than this are always searched in baseline mode
    pub min_vector_threshold: u32,
    /// Directory holding the predictor model artifacts
    pub model_dir: Option<PathBuf>,
    /// Number of recent visits the predictor session smooths over
    pub window_size: u32,
}

impl Default for OmegaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            target_recall: 0.95,
            min_vector_threshold: 10_000,
            model_dir: None,
            window_size: 100,
        }
    }
}

impl OmegaConfig {
    /// Read `omega.*` options on top of the defaults
    pub fn from_params(params: &Params) -> Result<Self> {
        let defaults = Self::default();
        let target_recall = params.get_f32("omega.target_recall", defaults.target_recall)?;
        if !(target_recall > 0.0 && target_recall <= 1.0) {
            return Err(OmegaError::InvalidParameter(format!(
                "omega.target_recall must be in (0, 1], got {target_recall}"
            )));
        }

        let window_size = params.get_u32("omega.window_size", defaults.window_size)?;
        if window_size == 0 {
            return Err(OmegaError::InvalidParameter(
                "omega.window_size must be at least 1".to_string(),
            ));
        }

        let model_dir = params.get_string("omega.model_dir", "")?;

        Ok(Self {
            enabled: params.get_bool("omega.enabled", defaults.enabled)?,
            target_recall,
            min_vector_threshold: params
                .get_u32("omega.min_vector_threshold", defaults.min_vector_threshold)?,
            model_dir: (!model_dir.is_empty()).then(|| PathBuf::from(model_dir)),
            window_size,
        })
    }

    /// Enable adaptive mode with the given model directory
    pub fn with_model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.enabled = true;
        self.model_dir = Some(dir.into());
        self
    }

    /// Set the recall target
    pub fn with_target_recall(mut self, recall: f32) -> Self {
        self.target_recall = recall;
        self
    }

    /// Set the activation threshold
    pub fn with_min_vector_threshold(mut self, threshold: u32) -> Self {
        self.min_vector_threshold = threshold;
        self
    }
}

/// Searcher configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearcherConfig {
    /// Search width used when a context does not override it
    pub ef_search: usize,
    /// Early-stop overlay options
    pub omega: OmegaConfig,
}

impl Default for SearcherConfig {
    fn default() -> Self {
        Self {
            ef_search: 50,
            omega: OmegaConfig::default(),
        }
    }
}

impl SearcherConfig {
    /// Read searcher options on top of the defaults
    pub fn from_params(params: &Params) -> Result<Self> {
        let ef_search = params.get_u32("hnsw.ef_search", Self::default().ef_search as u32)?;
        if ef_search == 0 {
            return Err(OmegaError::InvalidParameter(
                "hnsw.ef_search must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            ef_search: ef_search as usize,
            omega: OmegaConfig::from_params(params)?,
        })
    }
}
