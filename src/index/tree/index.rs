//! The tree index proper: optimistic replace with rollback, unique lookup,
//! deterministic sampling, the bulk-build lifecycle, and snapshot creation.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, trace};

use super::build::BuildBuffer;
use super::container::Tree;
use super::extent::ExtentAllocator;
use super::iterator::TreeIterator;
use super::snapshot::TreeSnapshot;
use crate::index::def::{DupReplaceMode, IndexDef};
use crate::index::key::{Comparator, IndexEntry, KeyProbe};
use crate::index::{Index, IndexIterator, SnapshotSource};
use crate::record::{RecordRef, Value};
use crate::types::{MemtreeError, Result};

/// Shared state between an index and its iterators and snapshots.
pub(crate) struct TreeCore<E> {
    pub(crate) tree: Tree<E>,
    pub(crate) cmp: Comparator,
}

/// Ordered in-memory index, generic over the hinted or plain entry layout.
pub struct TreeIndex<E: IndexEntry> {
    def: IndexDef,
    core: Arc<RwLock<TreeCore<E>>>,
    build: Option<BuildBuffer<E>>,
}

impl<E: IndexEntry> TreeIndex<E> {
    /// Creates an empty index drawing node memory from `allocator`.
    pub fn new(def: IndexDef, allocator: Arc<dyn ExtentAllocator>) -> Self {
        let cmp = Comparator::for_index(&def);
        Self {
            def,
            core: Arc::new(RwLock::new(TreeCore {
                tree: Tree::new(allocator),
                cmp,
            })),
            build: None,
        }
    }

}

/// Whether a displaced entry violates the duplicate-resolution mode.
///
/// Displacing the record being overwritten is always fine. Displacing any
/// other record is a constraint violation when the caller asked for a pure
/// insert, or when it expected to overwrite a specific record and hit a
/// different one.
fn dup_violates(
    dup: Option<&RecordRef>,
    old: Option<&RecordRef>,
    mode: DupReplaceMode,
) -> Option<bool> {
    match dup {
        None => {
            // `Some(false)` = no violation; `None` = nothing was displaced
            // but Replace mode demands a victim.
            if mode == DupReplaceMode::Replace {
                None
            } else {
                Some(false)
            }
        }
        Some(d) => {
            let same_as_old = old.is_some_and(|o| d.id() == o.id());
            if same_as_old {
                Some(false)
            } else {
                Some(old.is_some() || mode == DupReplaceMode::Insert)
            }
        }
    }
}

/// The replace cycle proper, run under the write lock with the worst-case
/// extent reservation already granted.
fn replace_in_tree<E: IndexEntry>(
    tree: &mut Tree<E>,
    cmp: &Comparator,
    def: &IndexDef,
    old: Option<&RecordRef>,
    new: Option<&RecordRef>,
    mode: DupReplaceMode,
) -> Result<Option<RecordRef>> {
    if let Some(new_record) = new {
        // A nullable-unique index orders equal non-NULL keys apart by
        // identity, so the optimistic insert below cannot displace such a
        // record on its own. Probe by the user key first; a hit under a
        // different identity is the duplicate to judge.
        let keyed_dup: Option<E> = if def.opts.unique
            && def.needs_identity_tiebreak()
            && !def.key_def.key_has_null(new_record)
        {
            tree.find(&|e: &E| cmp.key_def().compare_records(e.record(), new_record))
                .filter(|e| e.record().id() != new_record.id())
                .cloned()
        } else {
            None
        };

        let new_entry = E::new(new_record.clone(), cmp);
        let against_new = |e: &E| e.compare(&new_entry, cmp);
        // Optimistic insert: displace first, judge the displaced entry
        // after, roll back if it should not have been displaced.
        let dup = tree.insert(new_entry.clone(), &against_new)?;
        let from_insert = dup.is_some();
        let displaced = dup.or(keyed_dup);
        match dup_violates(displaced.as_ref().map(|e| e.record()), old, mode) {
            Some(false) => {}
            violation => {
                if tree.delete(&against_new)?.is_none() {
                    error!(index = %def.name, "rollback of optimistic insert found no entry");
                }
                if from_insert {
                    if let Some(entry) = &displaced {
                        let against_dup = |e: &E| e.compare(entry, cmp);
                        if let Err(err) = tree.insert(entry.clone(), &against_dup) {
                            error!(
                                index = %def.name,
                                %err,
                                "failed to restore displaced entry during rollback"
                            );
                        }
                    }
                }
                return Err(match violation {
                    Some(true) => MemtreeError::DuplicateKey {
                        index: def.name.clone(),
                        space: def.space.clone(),
                    },
                    _ => MemtreeError::NotFound {
                        index: def.name.clone(),
                        space: def.space.clone(),
                    },
                });
            }
        }
        if let Some(entry) = displaced {
            if !from_insert {
                // The equal-keyed record sits at its own identity slot;
                // remove it to complete the displacement.
                if tree.delete(&|e: &E| e.compare(&entry, cmp))?.is_none() {
                    error!(index = %def.name, "equal-keyed record vanished mid-replace");
                }
            }
            trace!(index = %def.name, "replace displaced an equal-keyed entry");
            return Ok(Some(entry.record().clone()));
        }
    }

    if let Some(old_record) = old {
        let old_entry = E::new(old_record.clone(), cmp);
        let against_old = |e: &E| e.compare(&old_entry, cmp);
        let removed = tree.delete(&against_old)?;
        return Ok(removed.map(|e| e.record().clone()));
    }
    Ok(None)
}

impl<E: IndexEntry> Index for TreeIndex<E> {
    fn def(&self) -> &IndexDef {
        &self.def
    }

    fn len(&self) -> usize {
        self.core.read().tree.len()
    }

    fn bytes_used(&self) -> usize {
        self.core.read().tree.bytes_used()
    }

    fn find_unique(&self, key: &[Value]) -> Option<RecordRef> {
        assert!(self.def.opts.unique, "point lookup on a non-unique index");
        assert_eq!(
            key.len(),
            self.def.key_def.part_count(),
            "point lookup requires the full key"
        );
        let core = self.core.read();
        let probe = KeyProbe {
            key,
            part_count: key.len(),
            hint: core.cmp.key_hint(key, key.len()),
        };
        let cmp = &core.cmp;
        core.tree
            .find(&|e: &E| e.compare_with_probe(&probe, cmp))
            .map(|e| e.record().clone())
    }

    fn random(&self, seed: u64) -> Option<RecordRef> {
        let core = self.core.read();
        core.tree.random(seed).map(|e| e.record().clone())
    }

    fn replace(
        &mut self,
        old: Option<&RecordRef>,
        new: Option<&RecordRef>,
        mode: DupReplaceMode,
    ) -> Result<Option<RecordRef>> {
        let mut core = self.core.write();
        let TreeCore { tree, cmp } = &mut *core;
        // One up-front reservation covers the whole cycle, so no step below
        // can run out of extents after the first node changed.
        if let Err(err) = tree.reserve_for_replace(new.is_some()) {
            tree.release_reserved();
            return Err(err);
        }
        let outcome = replace_in_tree(tree, cmp, &self.def, old, new, mode);
        tree.release_reserved();
        outcome
    }

    fn iterator(&self) -> Box<dyn IndexIterator> {
        Box::new(TreeIterator::new(self.core.clone()))
    }

    fn begin_build(&mut self) {
        debug_assert!(self.core.read().tree.is_empty(), "build into a used index");
        debug!(index = %self.def.name, "bulk build started");
        self.build = Some(BuildBuffer::new());
    }

    fn reserve(&mut self, additional: usize) -> Result<()> {
        match self.build.as_mut() {
            Some(buffer) => buffer.reserve(additional),
            None => Err(MemtreeError::Invalid("reserve outside an active build")),
        }
    }

    fn build_next(&mut self, record: &RecordRef) -> Result<()> {
        let core = self.core.read();
        let entry = E::new(record.clone(), &core.cmp);
        drop(core);
        match self.build.as_mut() {
            Some(buffer) => buffer.push(entry),
            None => Err(MemtreeError::Invalid("build_next outside an active build")),
        }
    }

    fn end_build(&mut self) -> Result<()> {
        let Some(buffer) = self.build.take() else {
            return Err(MemtreeError::Invalid("end_build outside an active build"));
        };
        let staged = buffer.len();
        let mut core = self.core.write();
        let TreeCore { tree, cmp } = &mut *core;
        let sorted = buffer.into_sorted(cmp);
        tree.bulk_load(sorted)?;
        debug!(index = %self.def.name, records = staged, "bulk build finished");
        Ok(())
    }

    fn snapshot(&mut self) -> Box<dyn SnapshotSource> {
        let mut core = self.core.write();
        let count = core.tree.len();
        let (root, generation) = core.tree.freeze();
        drop(core);
        Box::new(TreeSnapshot::new(self.core.clone(), root, generation, count))
    }
}
