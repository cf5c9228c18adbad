//! Per-query early-stop session of the bundled learned model

use super::model::{ModelArtifact, FEATURE_COUNT};
use super::{PredictorSession, SessionParams, SessionStats};
use crate::NodeId;
use std::collections::VecDeque;

const EPSILON: f32 = 1e-6;

/// Entry of the running top-k list: a distance and the visit at which it
/// entered the list
#[derive(Debug, Clone, Copy)]
struct TopEntry {
    distance: f32,
    since_visit: u64,
}

/// Per-query session of [`super::LearnedStopModel`]
///
/// Keeps its own size-k view of the best distances reported so far, which
/// lets it estimate how settled the result set is without access to the
/// search's heaps.
#[derive(Debug)]
pub struct LearnedStopSession<'m> {
    artifact: &'m ModelArtifact,
    stop_threshold: f32,
    k: usize,
    window_size: usize,

    hops: u64,
    comparisons: u64,
    last_prediction_hop: u64,
    dist_start: Option<f32>,
    kth_at_last_prediction: Option<f32>,

    top: Vec<TopEntry>,
    recent: VecDeque<bool>,
    recent_accepted: usize,
}

impl<'m> LearnedStopSession<'m> {
    pub fn new(artifact: &'m ModelArtifact, params: SessionParams) -> Self {
        let k = params.k.max(1) as usize;
        let window_size = params.window_size.max(1) as usize;
        Self {
            artifact,
            stop_threshold: artifact.threshold_for(params.target_recall),
            k,
            window_size,
            hops: 0,
            comparisons: 0,
            last_prediction_hop: 0,
            dist_start: None,
            kth_at_last_prediction: None,
            top: Vec::new(),
            recent: VecDeque::new(),
            recent_accepted: 0,
        }
    }

    fn offer(&mut self, distance: f32) {
        if self.top.len() == self.k {
            match self.top.last() {
                Some(worst) if distance < worst.distance => {}
                _ => return,
            }
        }

        let pos = self
            .top
            .partition_point(|entry| entry.distance.total_cmp(&distance).is_le());
        self.top.insert(
            pos,
            TopEntry {
                distance,
                since_visit: self.comparisons,
            },
        );
        self.top.truncate(self.k);
    }

    fn estimated_ground_truth(&self) -> u64 {
        let window = self.window_size as u64;
        if self.comparisons < window {
            return 0;
        }
        let settled_before = self.comparisons - window;
        self.top
            .iter()
            .filter(|entry| entry.since_visit <= settled_before)
            .count() as u64
    }

    fn features(&self) -> [f32; FEATURE_COUNT] {
        let best = self.top.first().map_or(0.0, |e| e.distance);
        let kth = self.top.last().map_or(0.0, |e| e.distance);
        let start = self.dist_start.unwrap_or(best);

        let best_gain = (start - best) / (start.abs() + EPSILON);
        let kth_gain = match self.kth_at_last_prediction {
            Some(previous) => (previous - kth) / (previous.abs() + EPSILON),
            None => 1.0,
        };
        let acceptance_rate = if self.recent.is_empty() {
            1.0
        } else {
            self.recent_accepted as f32 / self.recent.len() as f32
        };
        let stable_fraction = self.estimated_ground_truth() as f32 / self.k as f32;

        [
            (1.0 + self.hops as f32).ln(),
            (1.0 + self.comparisons as f32).ln(),
            best_gain,
            kth_gain,
            acceptance_rate,
            stable_fraction,
        ]
    }

    fn stop_probability(&self) -> f32 {
        let logit = self
            .features()
            .iter()
            .zip(&self.artifact.weights)
            .fold(self.artifact.bias, |acc, (x, w)| acc + x * w);
        1.0 / (1.0 + (-logit).exp())
    }
}

impl PredictorSession for LearnedStopSession<'_> {
    fn set_dist_start(&mut self, distance: f32) {
        self.dist_start = Some(distance);
        self.offer(distance);
    }

    fn report_visit(&mut self, _node: NodeId, distance: f32, accepted: bool) {
        self.comparisons += 1;

        self.recent.push_back(accepted);
        if accepted {
            self.recent_accepted += 1;
        }
        if self.recent.len() > self.window_size {
            if let Some(true) = self.recent.pop_front() {
                self.recent_accepted -= 1;
            }
        }

        self.offer(distance);
    }

    fn report_hop(&mut self) {
        self.hops += 1;
    }

    fn should_predict(&mut self) -> bool {
        let open = self.top.len() >= self.k
            && self.hops >= u64::from(self.artifact.min_hops)
            && self.hops - self.last_prediction_hop >= u64::from(self.artifact.predict_interval);
        if open {
            self.last_prediction_hop = self.hops;
        }
        open
    }

    fn should_stop(&mut self) -> bool {
        let stop = self.stop_probability() >= self.stop_threshold;
        self.kth_at_last_prediction = self.top.last().map(|e| e.distance);
        stop
    }

    fn stats(&self) -> SessionStats {
        SessionStats {
            hops: self.hops,
            comparisons: self.comparisons,
            estimated_ground_truth: self.estimated_ground_truth(),
        }
    }
}
