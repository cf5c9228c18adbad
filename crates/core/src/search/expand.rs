//! Base-level candidate expansion
//!
//! Each iteration peeks the closest frontier candidate and stops when it
//! cannot improve a full result heap. Otherwise the candidate is popped and
//! its unvisited neighbors are evaluated in one batch. A neighbor enters the
//! results (and the frontier) if the heap still has room or it beats the
//! current lower bound.
//!
//! With a predictor session attached, the session is consulted after the
//! standard stopping rule and before each pop, and is told about every hop
//! and every evaluated neighbor. Without one, the loop is exactly the
//! baseline search.

use super::context::{Scratch, SearchStats};
use super::heap::Candidate;
use crate::index::ProximityGraph;
use crate::metric::DistanceCalculator;
use crate::predictor::PredictorSession;
use crate::{NodeId, Result};
use tracing::debug;

/// Expand from `entry` at level 0 until convergence or an early stop
///
/// Scratch state is reset first; on return the result heap holds at most
/// `ef` entries.
pub fn expand<G>(
    graph: &G,
    dist: &dyn DistanceCalculator,
    entry: Candidate,
    ef: usize,
    scratch: Scratch<'_>,
    mut session: Option<&mut (dyn PredictorSession + '_)>,
    stats: &mut SearchStats,
) -> Result<()>
where
    G: ProximityGraph + ?Sized,
{
    let Scratch {
        visited,
        frontier,
        results,
    } = scratch;

    visited.reset(graph.node_count());
    frontier.clear();
    results.reset(ef);

    visited.insert(entry.node);
    frontier.push(entry);
    results.insert(entry);
    let mut lower_bound = entry.distance;

    let mut ids: Vec<NodeId> = Vec::new();
    let mut vectors: Vec<&[f32]> = Vec::new();
    let mut distances: Vec<f32> = Vec::new();

    while let Some(top) = frontier.peek() {
        if top.distance > lower_bound && results.is_full() {
            break;
        }

        if let Some(session) = session.as_deref_mut() {
            if session.should_predict() && session.should_stop() {
                stats.early_stopped = true;
                debug!(
                    hops = stats.hops,
                    comparisons = stats.comparisons,
                    results = results.len(),
                    "predictor stopped search early"
                );
                break;
            }
        }

        frontier.pop();
        stats.hops += 1;
        if let Some(session) = session.as_deref_mut() {
            session.report_hop();
        }

        ids.clear();
        ids.extend(
            graph
                .neighbors(0, top.node)
                .iter()
                .copied()
                .filter(|&n| visited.insert(n)),
        );
        if ids.is_empty() {
            continue;
        }

        vectors.clear();
        graph.fetch_vectors(&ids, &mut vectors)?;
        dist.batch_distance(&vectors, &mut distances);
        stats.comparisons += ids.len() as u64;

        for (&node, &distance) in ids.iter().zip(&distances) {
            let accepted = !results.is_full() || distance < lower_bound;
            if accepted {
                let candidate = Candidate::new(node, distance);
                frontier.push(candidate);
                results.insert(candidate);
                if let Some(worst) = results.worst() {
                    lower_bound = worst.distance;
                }
            }

            if let Some(session) = session.as_deref_mut() {
                session.report_visit(node, distance, accepted);
            }
        }
    }

    stats.visited = visited.len() as u64;
    Ok(())
}
