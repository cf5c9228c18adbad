//! Greedy descent through the upper levels
//!
//! From the entry point, move to the closest neighbor as long as it is
//! strictly closer than the current node; when no neighbor improves, drop
//! one level. This is a local hill-climb: it finds a local optimum
//! reachable from the entry point, not the global closest node of a level.

use super::heap::Candidate;
use crate::index::ProximityGraph;
use crate::metric::DistanceCalculator;
use crate::{Result, INVALID_NODE};

/// Descend from the top level to level 1
///
/// Returns the seed for base-level expansion, or `None` for an empty
/// graph. Every distance evaluation is added to `comparisons`.
pub fn descend<G>(
    graph: &G,
    dist: &dyn DistanceCalculator,
    comparisons: &mut u64,
) -> Result<Option<Candidate>>
where
    G: ProximityGraph + ?Sized,
{
    let entry = graph.entry_point();
    if entry == INVALID_NODE || graph.node_count() == 0 {
        return Ok(None);
    }

    let mut vectors = Vec::with_capacity(1);
    graph.fetch_vectors(&[entry], &mut vectors)?;
    let mut current = Candidate::new(entry, dist.distance(vectors[0]));
    *comparisons += 1;

    let mut distances = Vec::new();
    for level in (1..=graph.max_level()).rev() {
        loop {
            let neighbors = graph.neighbors(level, current.node);
            if neighbors.is_empty() {
                break;
            }

            vectors.clear();
            graph.fetch_vectors(neighbors, &mut vectors)?;
            dist.batch_distance(&vectors, &mut distances);
            *comparisons += neighbors.len() as u64;

            let mut best = current;
            for (&node, &d) in neighbors.iter().zip(&distances) {
                if d < best.distance {
                    best = Candidate::new(node, d);
                }
            }

            if best.node == current.node {
                break;
            }
            current = best;
        }
    }

    Ok(Some(current))
}
