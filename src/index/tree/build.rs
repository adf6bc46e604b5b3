//! Staging buffer for bulk index construction.
//!
//! Recovery feeds records one at a time; building the tree incrementally
//! would pay a search per record. Instead entries accumulate in a flat
//! buffer, get sorted once, and the container is assembled level by level
//! from the sorted run. Allocation failures surface as out-of-memory errors
//! instead of aborting, so a build can fail cleanly mid-recovery.

use crate::index::key::{Comparator, IndexEntry};
use crate::types::{MemtreeError, Result};

/// Growth floor for the staging buffer.
const MIN_CAPACITY: usize = 16;

/// Flat accumulation buffer used between `begin_build` and `end_build`.
pub(crate) struct BuildBuffer<E> {
    entries: Vec<E>,
}

impl<E: IndexEntry> BuildBuffer<E> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Pre-sizes the buffer for `additional` more entries.
    pub(crate) fn reserve(&mut self, additional: usize) -> Result<()> {
        self.entries
            .try_reserve_exact(additional)
            .map_err(|_| MemtreeError::OutOfMemory {
                requested: additional * std::mem::size_of::<E>(),
                subsystem: "build",
                operation: "reserve",
            })
    }

    /// Appends one entry, growing the buffer by half when full.
    pub(crate) fn push(&mut self, entry: E) -> Result<()> {
        if self.entries.len() == self.entries.capacity() {
            let cap = self.entries.capacity();
            let grown = (cap + cap / 2).max(MIN_CAPACITY);
            self.entries
                .try_reserve_exact(grown - self.entries.len())
                .map_err(|_| MemtreeError::OutOfMemory {
                    requested: (grown - cap) * std::mem::size_of::<E>(),
                    subsystem: "build",
                    operation: "build_next",
                })?;
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Consumes the buffer and returns its entries sorted under the full
    /// index order. The sort is stable, so entries pushed for equal keys in
    /// an index without an identity tiebreaker keep their arrival order.
    pub(crate) fn into_sorted(mut self, cmp: &Comparator) -> Vec<E> {
        self.entries.sort_by(|a, b| a.compare(b, cmp));
        self.entries
    }
}
