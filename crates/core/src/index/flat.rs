//! Exact (brute-force) search
//!
//! Computes the distance from the query to every node of a graph, or to
//! the nodes whose keys are listed. It is O(n) per query and serves as the
//! ground truth for recall measurements and as the fallback for filtered
//! lookups.

use super::ProximityGraph;
use crate::metric::{DistanceCalculator, QueryDistance};
use crate::search::context::{SearchContext, SearchStats};
use crate::search::heap::Candidate;
use crate::search::{materialize, HnswContext};
use crate::{Neighbor, NodeId, Result};
use std::collections::HashSet;

/// Nodes fetched per batch
const SCAN_BATCH: usize = 256;

/// Exact top-k over all nodes, or only over nodes whose key is in `keys`,
/// published into `ctx`
pub fn scan<G>(
    graph: &G,
    dist: &dyn DistanceCalculator,
    ctx: &mut dyn SearchContext,
    keys: Option<&[u64]>,
) -> Result<()>
where
    G: ProximityGraph + ?Sized,
{
    let topk = ctx.topk();
    let threshold = ctx.threshold();
    let mut stats = SearchStats::default();
    if topk == 0 || graph.node_count() == 0 {
        ctx.publish(Vec::new(), stats);
        return Ok(());
    }

    let wanted: Option<HashSet<u64>> = keys.map(|k| k.iter().copied().collect());
    let results = ctx.scratch().results;
    results.reset(topk);

    let mut ids: Vec<NodeId> = Vec::with_capacity(SCAN_BATCH);
    let mut vectors: Vec<&[f32]> = Vec::with_capacity(SCAN_BATCH);
    let mut distances: Vec<f32> = Vec::with_capacity(SCAN_BATCH);

    let count = graph.node_count() as NodeId;
    let mut next: NodeId = 0;
    while next < count {
        ids.clear();
        while next < count && ids.len() < SCAN_BATCH {
            let keep = wanted
                .as_ref()
                .map_or(true, |set| set.contains(&graph.key(next)));
            if keep {
                ids.push(next);
            }
            next += 1;
        }
        if ids.is_empty() {
            continue;
        }

        vectors.clear();
        graph.fetch_vectors(&ids, &mut vectors)?;
        dist.batch_distance(&vectors, &mut distances);
        stats.comparisons += ids.len() as u64;
        stats.visited += ids.len() as u64;

        for (&node, &distance) in ids.iter().zip(&distances) {
            results.insert(Candidate::new(node, distance));
        }
    }

    let hits = materialize(graph, results, topk, threshold);
    ctx.publish(hits, stats);
    Ok(())
}

/// Exact top-k for a raw query, using the graph's metric
pub fn search_exact<G>(
    graph: &G,
    query: &[f32],
    topk: usize,
    threshold: Option<f32>,
    keys: Option<&[u64]>,
) -> Result<Vec<Neighbor>>
where
    G: ProximityGraph + ?Sized,
{
    let dist = QueryDistance::new(graph.metric(), query, graph.dimension())?;
    let mut ctx = HnswContext::new(topk);
    if let Some(t) = threshold {
        ctx.set_threshold(t);
    }
    scan(graph, &dist, &mut ctx, keys)?;
    Ok(ctx.take_result())
}
