//! Search context capability interface
//!
//! The search loop never needs to know the concrete context type: it asks
//! a [`SearchContext`] for the query parameters and for mutable access to
//! the per-query scratch state, and hands the finished result back through
//! [`SearchContext::publish`].

use super::heap::{CandidateFrontier, ResultHeap};
use super::visited::VisitedFilter;
use crate::Neighbor;
use serde::{Deserialize, Serialize};

/// Counters collected while answering one query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStats {
    /// Candidates popped from the frontier at the base layer
    pub hops: u64,
    /// Distance evaluations, all layers included
    pub comparisons: u64,
    /// Distinct nodes marked visited at the base layer
    pub visited: u64,
    /// True if the predictor ended the search before convergence
    pub early_stopped: bool,
    /// Predictor's estimate of true neighbors found, when it ran
    pub estimated_ground_truth: Option<u64>,
}

/// Split mutable borrow of a context's scratch state
pub struct Scratch<'a> {
    pub visited: &'a mut VisitedFilter,
    pub frontier: &'a mut CandidateFrontier,
    pub results: &'a mut ResultHeap,
}

/// What the search loop needs from a per-query context
pub trait SearchContext {
    /// Number of results requested
    fn topk(&self) -> usize;

    /// Per-query search width override
    fn ef(&self) -> Option<usize>;

    /// Radius filter on result scores
    fn threshold(&self) -> Option<f32>;

    /// Scratch state, reset by the search loop before use
    fn scratch(&mut self) -> Scratch<'_>;

    /// Store the materialized result of the query
    fn publish(&mut self, hits: Vec<Neighbor>, stats: SearchStats);
}

/// Reusable context for searches over an [`crate::HnswGraph`]
#[derive(Debug, Clone)]
pub struct HnswContext {
    topk: usize,
    ef: Option<usize>,
    threshold: Option<f32>,

    visited: VisitedFilter,
    frontier: CandidateFrontier,
    results: ResultHeap,

    hits: Vec<Neighbor>,
    stats: SearchStats,
}

impl Default for HnswContext {
    fn default() -> Self {
        Self::new(10)
    }
}

impl HnswContext {
    /// Create a context returning `topk` results
    pub fn new(topk: usize) -> Self {
        Self {
            topk,
            ef: None,
            threshold: None,
            visited: VisitedFilter::default(),
            frontier: CandidateFrontier::new(),
            results: ResultHeap::default(),
            hits: Vec::new(),
            stats: SearchStats::default(),
        }
    }

    pub fn set_topk(&mut self, topk: usize) -> &mut Self {
        self.topk = topk;
        self
    }

    /// Override the searcher's search width for following queries
    pub fn set_ef(&mut self, ef: usize) -> &mut Self {
        self.ef = Some(ef);
        self
    }

    pub fn reset_ef(&mut self) -> &mut Self {
        self.ef = None;
        self
    }

    /// Keep only results whose score is within `threshold`
    pub fn set_threshold(&mut self, threshold: f32) -> &mut Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn reset_threshold(&mut self) -> &mut Self {
        self.threshold = None;
        self
    }

    /// Results of the last query, best first
    pub fn result(&self) -> &[Neighbor] {
        &self.hits
    }

    /// Take ownership of the last results
    pub fn take_result(&mut self) -> Vec<Neighbor> {
        std::mem::take(&mut self.hits)
    }

    /// Counters of the last query
    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }
}

impl SearchContext for HnswContext {
    fn topk(&self) -> usize {
        self.topk
    }

    fn ef(&self) -> Option<usize> {
        self.ef
    }

    fn threshold(&self) -> Option<f32> {
        self.threshold
    }

    fn scratch(&mut self) -> Scratch<'_> {
        Scratch {
            visited: &mut self.visited,
            frontier: &mut self.frontier,
            results: &mut self.results,
        }
    }

    fn publish(&mut self, hits: Vec<Neighbor>, stats: SearchStats) {
        self.hits = hits;
        self.stats = stats;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_setters() {
        let mut ctx = HnswContext::new(5);
        ctx.set_topk(20).set_ef(64).set_threshold(1.5);
        assert_eq!(ctx.topk(), 20);
        assert_eq!(SearchContext::ef(&ctx), Some(64));
        assert_eq!(ctx.threshold(), Some(1.5));

        ctx.reset_threshold().reset_ef();
        assert_eq!(ctx.threshold(), None);
        assert_eq!(SearchContext::ef(&ctx), None);
    }

    #[test]
    fn test_publish_replaces_previous_result() {
        let mut ctx = HnswContext::new(2);
        ctx.publish(
            vec![Neighbor { key: 1, score: 0.5 }],
            SearchStats {
                hops: 3,
                ..SearchStats::default()
            },
        );
        assert_eq!(ctx.result().len(), 1);
        assert_eq!(ctx.stats().hops, 3);

        ctx.publish(Vec::new(), SearchStats::default());
        assert!(ctx.result().is_empty());
        assert_eq!(ctx.stats().hops, 0);
    }
}
