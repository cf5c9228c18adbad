//! Per-query visited filter
//!
//! A flat bitset over node identifiers. Bits are only ever set during a
//! query; [`VisitedFilter::reset`] clears everything before the next one.

use crate::NodeId;

/// Write-once membership set over node identifiers
#[derive(Debug, Clone, Default)]
pub struct VisitedFilter {
    bits: Vec<u64>,
    capacity: usize,
    count: usize,
}

impl VisitedFilter {
    /// Create a filter able to hold `capacity` nodes without growing
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bits: vec![0u64; capacity.div_ceil(64)],
            capacity,
            count: 0,
        }
    }

    /// Clear all bits and size the filter for `capacity` nodes
    pub fn reset(&mut self, capacity: usize) {
        let words = capacity.div_ceil(64);
        self.bits.clear();
        self.bits.resize(words, 0);
        self.capacity = capacity;
        self.count = 0;
    }

    /// Mark `node` as visited; returns true if it was not visited before
    #[inline(always)]
    pub fn insert(&mut self, node: NodeId) -> bool {
        let idx = node as usize;
        if idx >= self.capacity {
            self.grow(idx + 1);
        }

        let word = &mut self.bits[idx / 64];
        let mask = 1u64 << (idx % 64);
        let was_clear = *word & mask == 0;
        *word |= mask;
        if was_clear {
            self.count += 1;
        }
        was_clear
    }

    /// Check whether `node` has been visited
    #[inline(always)]
    pub fn contains(&self, node: NodeId) -> bool {
        let idx = node as usize;
        idx < self.capacity && self.bits[idx / 64] & (1u64 << (idx % 64)) != 0
    }

    /// Number of distinct nodes visited since the last reset
    pub fn len(&self) -> usize {
        self.count
    }

    /// True if nothing has been visited since the last reset
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn grow(&mut self, capacity: usize) {
        let words = capacity.div_ceil(64);
        if words > self.bits.len() {
            self.bits.resize(words, 0);
        }
        self.capacity = self.bits.len() * 64;
    }
}
