//! Adaptive graph search
//!
//! One query runs in three steps:
//!
//! 1. [`navigate::descend`]: greedy descent from the entry point to level 1
//! 2. [`expand::expand`]: bounded-width expansion at level 0, optionally
//!    consulting a [`PredictorSession`] for early termination
//! 3. [`materialize`]: the result heap becomes a list of [`Neighbor`]s,
//!    best first, filtered by the context's radius threshold
//!
//! The controller only sees the graph through [`ProximityGraph`] and the
//! context through [`SearchContext`].

pub mod context;
pub mod expand;
pub mod heap;
pub mod navigate;
pub mod visited;

pub use context::{HnswContext, Scratch, SearchContext, SearchStats};
pub use heap::{Candidate, CandidateFrontier, ResultHeap};
pub use visited::VisitedFilter;

use crate::index::ProximityGraph;
use crate::metric::{DistanceCalculator, Metric};
use crate::predictor::PredictorSession;
use crate::{Neighbor, Result};

/// Answer one query against `graph`, publishing the result into `ctx`
///
/// The search width is the context's override or `default_ef`, raised to
/// at least `topk`. With `session` set to `None` this is the baseline
/// search. An empty graph or `topk == 0` publishes an empty result. A vector
/// fetch failure aborts the query and leaves the previous result in `ctx`
/// untouched.
pub fn search_graph<G>(
    graph: &G,
    dist: &dyn DistanceCalculator,
    ctx: &mut dyn SearchContext,
    default_ef: usize,
    mut session: Option<&mut (dyn PredictorSession + '_)>,
) -> Result<()>
where
    G: ProximityGraph + ?Sized,
{
    let topk = ctx.topk();
    let mut stats = SearchStats::default();
    if topk == 0 {
        ctx.publish(Vec::new(), stats);
        return Ok(());
    }

    let Some(entry) = navigate::descend(graph, dist, &mut stats.comparisons)? else {
        ctx.publish(Vec::new(), stats);
        return Ok(());
    };

    if let Some(session) = session.as_deref_mut() {
        session.set_dist_start(entry.distance);
    }

    let ef = ctx.ef().unwrap_or(default_ef).max(topk);
    let threshold = ctx.threshold();
    expand::expand(
        graph,
        dist,
        entry,
        ef,
        ctx.scratch(),
        session.as_deref_mut(),
        &mut stats,
    )?;

    if let Some(session) = session.as_deref() {
        stats.estimated_ground_truth = Some(session.stats().estimated_ground_truth);
    }

    let hits = materialize(graph, ctx.scratch().results, topk, threshold);
    ctx.publish(hits, stats);
    Ok(())
}

/// Turn a result heap into the caller-facing list
///
/// Entries are ordered by ascending internal distance (ascending score for
/// ascending metrics, descending score otherwise), truncated to `topk`, then
/// filtered by `threshold` if set.
pub fn materialize<G>(
    graph: &G,
    results: &mut ResultHeap,
    topk: usize,
    threshold: Option<f32>,
) -> Vec<Neighbor>
where
    G: ProximityGraph + ?Sized,
{
    let metric: Metric = graph.metric();
    results
        .drain_sorted()
        .into_iter()
        .take(topk)
        .map(|c| Neighbor {
            key: graph.key(c.node),
            score: metric.score_from_distance(c.distance),
        })
        .filter(|n| threshold.map_or(true, |t| metric.within_threshold(n.score, t)))
        .collect()
}
