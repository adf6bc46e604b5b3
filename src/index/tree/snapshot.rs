//! Frozen-generation snapshot scan.
//!
//! Checkpointing wants a stable view of the index without stopping writers.
//! Creating a snapshot freezes the current pool generation and remembers the
//! root; every later mutation copies nodes instead of touching what the
//! frozen root can reach, so the scan below walks an immutable structure at
//! its own pace. Dropping the snapshot thaws the generation and releases
//! whatever it alone kept alive.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::container::Node;
use super::extent::ExtentId;
use super::index::TreeCore;
use crate::index::key::IndexEntry;
use crate::index::SnapshotSource;
use crate::record::RecordRef;

/// Ordered scan over the records captured by one freeze.
pub struct TreeSnapshot<E: IndexEntry> {
    core: Arc<RwLock<TreeCore<E>>>,
    generation: u64,
    count: usize,
    // Explicit descent stack: (node, next child or entry index).
    stack: Vec<(ExtentId, usize)>,
}

impl<E: IndexEntry> TreeSnapshot<E> {
    pub(crate) fn new(
        core: Arc<RwLock<TreeCore<E>>>,
        root: Option<ExtentId>,
        generation: u64,
        count: usize,
    ) -> Self {
        debug!(generation, records = count, "index snapshot frozen");
        Self {
            core,
            generation,
            count,
            stack: root.map(|r| (r, 0)).into_iter().collect(),
        }
    }
}

impl<E: IndexEntry> SnapshotSource for TreeSnapshot<E> {
    fn next_record(&mut self) -> Option<RecordRef> {
        let core = self.core.read();
        while let Some(&(id, idx)) = self.stack.last() {
            let node = core
                .tree
                .frozen_node(id)
                .expect("frozen extent reclaimed before thaw");
            match node {
                Node::Inner { children, .. } => {
                    if idx < children.len() {
                        self.stack.last_mut().expect("non-empty stack").1 += 1;
                        self.stack.push((children[idx], 0));
                    } else {
                        self.stack.pop();
                    }
                }
                Node::Leaf { entries } => {
                    if idx < entries.len() {
                        self.stack.last_mut().expect("non-empty stack").1 += 1;
                        return Some(entries[idx].record().clone());
                    }
                    self.stack.pop();
                }
            }
        }
        None
    }

    fn record_count(&self) -> usize {
        self.count
    }
}

impl<E: IndexEntry> Drop for TreeSnapshot<E> {
    fn drop(&mut self) {
        let mut core = self.core.write();
        core.tree.thaw(self.generation);
        debug!(generation = self.generation, "index snapshot released");
    }
}
