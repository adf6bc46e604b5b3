//! Extent-backed node storage for the tree container.
//!
//! The surrounding engine supplies memory in fixed-size extents through the
//! [`ExtentAllocator`] capability; the pool binds one tree node to one extent
//! and layers the frozen-generation protocol on top: while a snapshot holds a
//! generation frozen, nodes reachable from it are copied before mutation and
//! their retirement is deferred until the snapshot thaws.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::types::{MemtreeError, Result};

/// Fixed extent size used for byte accounting, one tree node per extent.
pub const EXTENT_SIZE: usize = 1024;

/// Capability granting and reclaiming fixed-size memory blocks. The pool owns
/// the actual storage; the allocator meters it, which is what lets tests
/// exercise every out-of-memory path deterministically.
pub trait ExtentAllocator: Send + Sync {
    /// Grants one extent. Returns `false` when the budget is exhausted.
    fn alloc_extent(&self) -> bool;

    /// Returns one previously granted extent.
    fn free_extent(&self);
}

/// Default process-heap allocator with an optional byte quota.
#[derive(Debug, Default)]
pub struct HeapAllocator {
    quota: Option<usize>,
    in_use: AtomicUsize,
}

impl HeapAllocator {
    /// Unlimited allocator.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Allocator refusing grants beyond `quota` bytes.
    pub fn with_quota(quota: usize) -> Self {
        Self {
            quota: Some(quota),
            in_use: AtomicUsize::new(0),
        }
    }

    /// Bytes currently granted.
    pub fn bytes_in_use(&self) -> usize {
        self.in_use.load(Ordering::Relaxed)
    }
}

impl ExtentAllocator for HeapAllocator {
    fn alloc_extent(&self) -> bool {
        let granted = self.in_use.fetch_add(EXTENT_SIZE, Ordering::Relaxed) + EXTENT_SIZE;
        if let Some(quota) = self.quota {
            if granted > quota {
                self.in_use.fetch_sub(EXTENT_SIZE, Ordering::Relaxed);
                return false;
            }
        }
        true
    }

    fn free_extent(&self) {
        self.in_use.fetch_sub(EXTENT_SIZE, Ordering::Relaxed);
    }
}

/// Handle to one extent inside a pool.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ExtentId(u32);

struct Slot<N> {
    node: Option<N>,
    born: u64,
    retired: bool,
}

struct Garbage {
    id: ExtentId,
    born: u64,
    retired_at: u64,
}

/// Slab of extents holding tree nodes, with copy-on-write under freezes.
pub struct ExtentPool<N> {
    slots: Vec<Slot<N>>,
    free: Vec<ExtentId>,
    garbage: Vec<Garbage>,
    frozen: Vec<u64>,
    generation: u64,
    reserved: usize,
    in_use: usize,
    allocator: std::sync::Arc<dyn ExtentAllocator>,
}

impl<N: Clone> ExtentPool<N> {
    /// Creates an empty pool metered by `allocator`.
    pub fn new(allocator: std::sync::Arc<dyn ExtentAllocator>) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            garbage: Vec::new(),
            frozen: Vec::new(),
            generation: 0,
            reserved: 0,
            in_use: 0,
            allocator,
        }
    }

    /// Ensures `n` extents are granted ahead of a mutation so the mutation
    /// itself cannot fail mid-way. Already-held reservations count.
    pub fn reserve(&mut self, n: usize, operation: &'static str) -> Result<()> {
        while self.reserved < n {
            if !self.allocator.alloc_extent() {
                return Err(MemtreeError::OutOfMemory {
                    requested: EXTENT_SIZE,
                    subsystem: "tree",
                    operation,
                });
            }
            self.reserved += 1;
        }
        Ok(())
    }

    /// Returns unconsumed reservations to the allocator.
    pub fn release_reservation(&mut self) {
        for _ in 0..self.reserved {
            self.allocator.free_extent();
        }
        self.reserved = 0;
    }

    /// Binds `node` to a fresh extent at the current generation.
    pub fn alloc(&mut self, node: N, operation: &'static str) -> Result<ExtentId> {
        if self.reserved > 0 {
            self.reserved -= 1;
        } else if !self.allocator.alloc_extent() {
            return Err(MemtreeError::OutOfMemory {
                requested: EXTENT_SIZE,
                subsystem: "tree",
                operation,
            });
        }
        self.in_use += 1;
        let slot = Slot {
            node: Some(node),
            born: self.generation,
            retired: false,
        };
        match self.free.pop() {
            Some(id) => {
                self.slots[id.0 as usize] = slot;
                Ok(id)
            }
            None => {
                let id = ExtentId(self.slots.len() as u32);
                self.slots.push(slot);
                Ok(id)
            }
        }
    }

    /// The node bound to `id` if it is still part of the live structure.
    /// Retired extents held for frozen readers are invisible here, which is
    /// what makes stale cursor positions detectable.
    pub fn get_live(&self, id: ExtentId) -> Option<&N> {
        let slot = self.slots.get(id.0 as usize)?;
        if slot.retired {
            return None;
        }
        slot.node.as_ref()
    }

    /// The node bound to `id` regardless of retirement. Frozen traversals
    /// use this to keep reading nodes the live tree has already dropped.
    pub fn get_any(&self, id: ExtentId) -> Option<&N> {
        self.slots.get(id.0 as usize)?.node.as_ref()
    }

    /// Mutable access to a live node. The caller must have routed the id
    /// through [`ExtentPool::make_mut`] first.
    pub fn node_mut(&mut self, id: ExtentId) -> &mut N {
        let slot = &mut self.slots[id.0 as usize];
        debug_assert!(!slot.retired);
        slot.node.as_mut().expect("mutating a freed extent")
    }

    /// Makes the node at `id` safe to mutate in place. Nodes still reachable
    /// from a frozen generation are cloned into a fresh extent and the
    /// original is retired; the returned id replaces the old one in the
    /// parent.
    pub fn make_mut(&mut self, id: ExtentId, operation: &'static str) -> Result<ExtentId> {
        let slot = &self.slots[id.0 as usize];
        if !self.must_preserve(slot.born) {
            return Ok(id);
        }
        let copy = slot.node.clone().expect("copying a freed extent");
        let new_id = self.alloc(copy, operation)?;
        self.retire(id);
        Ok(new_id)
    }

    /// Drops the node at `id` from the live structure. Physical reclamation
    /// is deferred while any frozen generation can still reach it.
    pub fn retire(&mut self, id: ExtentId) {
        let born = self.slots[id.0 as usize].born;
        if self.must_preserve(born) {
            self.slots[id.0 as usize].retired = true;
            self.garbage.push(Garbage {
                id,
                born,
                retired_at: self.generation,
            });
        } else {
            self.free_slot(id);
        }
    }

    /// Freezes the current generation and returns it. Subsequent mutations
    /// copy rather than touch anything the frozen generation can reach.
    pub fn freeze(&mut self) -> u64 {
        let frozen = self.generation;
        self.frozen.push(frozen);
        self.generation += 1;
        frozen
    }

    /// Releases a frozen generation and reclaims garbage no remaining
    /// freeze needs.
    pub fn thaw(&mut self, generation: u64) {
        if let Some(at) = self.frozen.iter().position(|&g| g == generation) {
            self.frozen.swap_remove(at);
        }
        let mut kept = Vec::new();
        for entry in std::mem::take(&mut self.garbage) {
            let needed = self
                .frozen
                .iter()
                .any(|&f| entry.born <= f && f < entry.retired_at);
            if needed {
                kept.push(entry);
            } else {
                self.free_slot(entry.id);
            }
        }
        self.garbage = kept;
    }

    /// Whether any generation is currently frozen.
    pub fn has_frozen(&self) -> bool {
        !self.frozen.is_empty()
    }

    /// Bytes held by live and frozen-preserved extents.
    pub fn bytes_used(&self) -> usize {
        self.in_use * EXTENT_SIZE
    }

    /// Number of extents currently bound to nodes.
    pub fn extents_in_use(&self) -> usize {
        self.in_use
    }

    fn must_preserve(&self, born: u64) -> bool {
        self.frozen.iter().any(|&f| f >= born)
    }

    fn free_slot(&mut self, id: ExtentId) {
        let slot = &mut self.slots[id.0 as usize];
        debug_assert!(slot.node.is_some());
        slot.node = None;
        slot.retired = false;
        self.free.push(id);
        self.in_use -= 1;
        self.allocator.free_extent();
    }
}

impl<N> Drop for ExtentPool<N> {
    fn drop(&mut self) {
        for _ in 0..self.in_use + self.reserved {
            self.allocator.free_extent();
        }
    }
}
