use super::session::LearnedStopSession;
use super::{PredictorModel, PredictorSession, SessionParams};
use crate::{OmegaError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// File the model is read from inside the model directory
pub const MODEL_FILE_NAME: &str = "omega_model.json";

/// Artifact format version understood by this build
pub const MODEL_VERSION: u32 = 1;

/// Number of features fed to the stop classifier
pub const FEATURE_COUNT: usize = 6;

/// Maps a target recall to the stop-probability threshold that achieved it
/// during training
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub target_recall: f32,
    pub threshold: f32,
}

/// On-disk form of a trained early-stop model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: u32,
    /// Logistic weights, one per feature
    pub weights: Vec<f32>,
    pub bias: f32,
    /// Hops between two model evaluations
    pub predict_interval: u32,
    /// Hops before the first evaluation
    pub min_hops: u32,
    /// Sorted by `target_recall`
    pub calibration: Vec<CalibrationPoint>,
}

impl ModelArtifact {
    /// Check the artifact for internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.version != MODEL_VERSION {
            return Err(OmegaError::Predictor(format!(
                "unsupported model version {} (expected {MODEL_VERSION})",
                self.version
            )));
        }
        if self.weights.len() != FEATURE_COUNT {
            return Err(OmegaError::Predictor(format!(
                "expected {FEATURE_COUNT} weights, got {}",
                self.weights.len()
            )));
        }
        if self.weights.iter().any(|w| !w.is_finite()) || !self.bias.is_finite() {
            return Err(OmegaError::Predictor("non-finite model weights".to_string()));
        }
        if self.predict_interval == 0 {
            return Err(OmegaError::Predictor(
                "predict_interval must be at least 1".to_string(),
            ));
        }
        if self.calibration.is_empty() {
            return Err(OmegaError::Predictor("empty calibration table".to_string()));
        }
        for point in &self.calibration {
            if !(0.0..=1.0).contains(&point.threshold) || !point.target_recall.is_finite() {
                return Err(OmegaError::Predictor(format!(
                    "invalid calibration point {point:?}"
                )));
            }
        }
        if self
            .calibration
            .windows(2)
            .any(|pair| pair[0].target_recall >= pair[1].target_recall)
        {
            return Err(OmegaError::Predictor(
                "calibration table must be strictly increasing in target_recall".to_string(),
            ));
        }
        Ok(())
    }

    /// Stop-probability threshold for a target recall, linearly
    /// interpolated and clamped to the ends of the table
    pub fn threshold_for(&self, target_recall: f32) -> f32 {
        let table = &self.calibration;
        let (Some(first), Some(last)) = (table.first(), table.last()) else {
            return 1.0;
        };
        if target_recall <= first.target_recall {
            return first.threshold;
        }
        if target_recall >= last.target_recall {
            return last.threshold;
        }

        for pair in table.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            if target_recall <= hi.target_recall {
                let t = (target_recall - lo.target_recall) / (hi.target_recall - lo.target_recall);
                return lo.threshold + t * (hi.threshold - lo.threshold);
            }
        }
        last.threshold
    }

    /// Write the artifact as pretty JSON into `dir`
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| OmegaError::Predictor(format!("failed to encode model: {e}")))?;
        fs::write(dir.join(MODEL_FILE_NAME), json)?;
        Ok(())
    }
}

/// Logistic early-stop model read from [`MODEL_FILE_NAME`]
#[derive(Debug, Clone, Default)]
pub struct LearnedStopModel {
    artifact: Option<ModelArtifact>,
}

impl LearnedStopModel {
    /// An unloaded model
    pub fn new() -> Self {
        Self::default()
    }

    /// A model loaded from an in-memory artifact
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self> {
        artifact.validate()?;
        Ok(Self {
            artifact: Some(artifact),
        })
    }

    /// The loaded artifact, if any
    pub fn artifact(&self) -> Option<&ModelArtifact> {
        self.artifact.as_ref()
    }
}

impl PredictorModel for LearnedStopModel {
    fn load(&mut self, dir: &Path) -> Result<()> {
        self.artifact = None;

        let path = dir.join(MODEL_FILE_NAME);
        let bytes = fs::read(&path).map_err(|e| {
            OmegaError::Predictor(format!("failed to read {}: {e}", path.display()))
        })?;
        let artifact: ModelArtifact = serde_json::from_slice(&bytes).map_err(|e| {
            OmegaError::Predictor(format!("failed to parse {}: {e}", path.display()))
        })?;
        artifact.validate()?;

        debug!(
            path = %path.display(),
            predict_interval = artifact.predict_interval,
            min_hops = artifact.min_hops,
            "loaded early-stop model"
        );
        self.artifact = Some(artifact);
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.artifact.is_some()
    }

    fn create_session(&self, params: SessionParams) -> Option<Box<dyn PredictorSession + '_>> {
        let artifact = self.artifact.as_ref()?;
        if params.k == 0
            || params.window_size == 0
            || !(params.target_recall > 0.0 && params.target_recall <= 1.0)
        {
            return None;
        }
        Some(Box::new(LearnedStopSession::new(artifact, params)))
    }
}
