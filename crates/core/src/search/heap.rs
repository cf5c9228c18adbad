//! Candidate frontier and bounded result heap
//!
//! Both heaps order [`Candidate`]s by distance, breaking ties by node id so
//! that a search over the same graph always pops nodes in the same order.

use crate::NodeId;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// A node together with its distance to the query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub node: NodeId,
    pub distance: f32,
}

impl Candidate {
    #[inline]
    pub fn new(node: NodeId, distance: f32) -> Self {
        Self { node, distance }
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.node.cmp(&other.node))
    }
}

/// Min-priority queue of nodes still to be expanded
#[derive(Debug, Clone, Default)]
pub struct CandidateFrontier {
    heap: BinaryHeap<Reverse<Candidate>>,
}

impl CandidateFrontier {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, candidate: Candidate) {
        self.heap.push(Reverse(candidate));
    }

    /// Closest candidate, without removing it
    #[inline]
    pub fn peek(&self) -> Option<Candidate> {
        self.heap.peek().map(|Reverse(c)| *c)
    }

    /// Remove and return the closest candidate
    #[inline]
    pub fn pop(&mut self) -> Option<Candidate> {
        self.heap.pop().map(|Reverse(c)| c)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// Iterate the queued candidates in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.heap.iter().map(|Reverse(c)| c)
    }
}

/// Max-priority queue holding at most `capacity` best candidates
#[derive(Debug, Clone, Default)]
pub struct ResultHeap {
    heap: BinaryHeap<Candidate>,
    capacity: usize,
}

impl ResultHeap {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Empty the heap and change its capacity
    pub fn reset(&mut self, capacity: usize) {
        self.heap.clear();
        self.capacity = capacity;
    }

    /// Insert a candidate, evicting and returning the worst entry when the
    /// heap grows past its capacity
    #[inline]
    pub fn insert(&mut self, candidate: Candidate) -> Option<Candidate> {
        self.heap.push(candidate);
        if self.heap.len() > self.capacity {
            self.heap.pop()
        } else {
            None
        }
    }

    /// Worst retained entry
    #[inline]
    pub fn worst(&self) -> Option<Candidate> {
        self.heap.peek().copied()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Iterate the retained entries in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.heap.iter()
    }

    /// Drain the heap into a vector sorted by ascending distance
    pub fn drain_sorted(&mut self) -> Vec<Candidate> {
        let mut sorted = std::mem::take(&mut self.heap).into_sorted_vec();
        sorted.shrink_to_fit();
        sorted
    }
}
