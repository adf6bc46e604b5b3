//! Scan iterators over the tree: the six scan modes, the equality-run
//! filter, and re-synchronization after the tree changed underneath a
//! position.
//!
//! An iterator never blocks writers. `init` only records what to scan; the
//! opening bound search runs on the first step, against the tree as it is
//! then, so mutations landing between `init` and that step are observed.
//! From then on the iterator remembers the path it last stood on plus a
//! handle to the element it last returned; on every step it first checks
//! whether the remembered path still leads to that element, and when it does
//! not (the element was deleted, or node splits and merges moved it) it
//! re-derives its position by searching for the remembered element under the
//! full order. Forward scans continue at the first element above it,
//! backward scans at the last element below it, so no element is skipped or
//! returned twice.

use std::sync::Arc;

use parking_lot::RwLock;

use super::container::TreePos;
use super::index::TreeCore;
use crate::index::def::ScanType;
use crate::index::key::{IndexEntry, KeyProbe};
use crate::index::IndexIterator;
use crate::record::{RecordRef, Value};
use crate::types::{MemtreeError, Result};

/// Reusable scan iterator over one tree index.
///
/// Created dead; [`IndexIterator::init`] arms it and may be called again at
/// any time to start a fresh scan, reusing the allocation.
pub struct TreeIterator<E: IndexEntry> {
    core: Arc<RwLock<TreeCore<E>>>,
    scan: ScanType,
    key: Vec<Value>,
    part_count: usize,
    key_hint: Option<u64>,
    pos: TreePos,
    current: Option<E>,
    started: bool,
    done: bool,
}

impl<E: IndexEntry> TreeIterator<E> {
    pub(crate) fn new(core: Arc<RwLock<TreeCore<E>>>) -> Self {
        Self {
            core,
            scan: ScanType::All,
            key: Vec::new(),
            part_count: 0,
            key_hint: None,
            pos: TreePos::invalid(),
            current: None,
            started: false,
            done: true,
        }
    }

    fn finish(&mut self) {
        self.pos = TreePos::invalid();
        self.current = None;
        self.done = true;
    }

    /// Runs the opening bound search for the armed scan. Returns the start
    /// position and its entry, or `None` when the scan matches nothing.
    fn start(&self, core: &TreeCore<E>) -> Option<(TreePos, E)> {
        let probe = KeyProbe {
            key: &self.key,
            part_count: self.part_count,
            hint: self.key_hint,
        };
        let cmp = &core.cmp;
        let against_key = |e: &E| e.compare_with_probe(&probe, cmp);
        let pos = match self.scan {
            ScanType::All | ScanType::Ge => Some(core.tree.lower_bound(&against_key).0),
            ScanType::Eq => {
                let (pos, exact) = core.tree.lower_bound(&against_key);
                exact.then_some(pos)
            }
            ScanType::Gt => Some(core.tree.upper_bound(&against_key).0),
            ScanType::Le => {
                let (pos, _) = core.tree.upper_bound(&against_key);
                Some(core.tree.prev_pos(&pos))
            }
            ScanType::Lt => {
                let (pos, _) = core.tree.lower_bound(&against_key);
                Some(core.tree.prev_pos(&pos))
            }
            ScanType::Req => {
                let (pos, exact) = core.tree.upper_bound(&against_key);
                exact.then(|| core.tree.prev_pos(&pos))
            }
        };
        pos.and_then(|p| core.tree.entry_at(&p).cloned().map(|e| (p, e)))
    }

    /// Whether the entry at the current position still belongs to the
    /// equality run an EQ/REQ scan is confined to.
    fn within_equal_run(&self, entry: &E, core: &TreeCore<E>) -> bool {
        if !matches!(self.scan, ScanType::Eq | ScanType::Req) {
            return true;
        }
        let probe = KeyProbe {
            key: &self.key,
            part_count: self.part_count,
            hint: self.key_hint,
        };
        entry.compare_with_probe(&probe, &core.cmp) == std::cmp::Ordering::Equal
    }
}

impl<E: IndexEntry> IndexIterator for TreeIterator<E> {
    fn init(&mut self, scan: ScanType, key: &[Value]) -> Result<()> {
        let core_arc = self.core.clone();
        let core = core_arc.read();
        if key.len() > core.cmp.key_def().part_count() {
            drop(core);
            self.finish();
            return Err(MemtreeError::Invalid(
                "search key has more parts than the index key",
            ));
        }

        // A full scan ignores any key; an equality or range scan without a
        // key degenerates into the full scan of matching direction.
        let key: Vec<Value> = if scan == ScanType::All {
            Vec::new()
        } else {
            key.to_vec()
        };
        let part_count = key.len();
        let scan = if part_count == 0 {
            match scan {
                ScanType::Req | ScanType::Lt | ScanType::Le => ScanType::Le,
                _ => ScanType::Ge,
            }
        } else {
            scan
        };
        let key_hint = core.cmp.key_hint(&key, part_count);
        drop(core);

        self.scan = scan;
        self.key = key;
        self.part_count = part_count;
        self.key_hint = key_hint;
        self.pos = TreePos::invalid();
        self.current = None;
        self.started = false;
        self.done = false;
        Ok(())
    }

    fn next(&mut self) -> Option<RecordRef> {
        if self.done {
            return None;
        }
        let core_arc = self.core.clone();
        let core = core_arc.read();

        if !self.started {
            self.started = true;
            return match self.start(&core) {
                Some((pos, entry)) => {
                    let record = entry.record().clone();
                    self.pos = pos;
                    self.current = Some(entry);
                    Some(record)
                }
                None => {
                    self.finish();
                    None
                }
            };
        }

        let Some(last) = self.current.take() else {
            self.finish();
            return None;
        };
        let cmp = &core.cmp;
        let against_last = |e: &E| e.compare(&last, cmp);

        let still_there = core
            .tree
            .entry_at(&self.pos)
            .is_some_and(|e| e.same_record(&last));
        self.pos = if self.scan.is_reverse() {
            if still_there {
                core.tree.prev_pos(&self.pos)
            } else {
                // The last returned element is gone; the element before where
                // it would sort is the next one to visit.
                let (bound, _) = core.tree.lower_bound(&against_last);
                core.tree.prev_pos(&bound)
            }
        } else if still_there {
            core.tree.next_pos(&self.pos)
        } else {
            core.tree.upper_bound(&against_last).0
        };

        match core.tree.entry_at(&self.pos).cloned() {
            Some(entry) if self.within_equal_run(&entry, &core) => {
                let record = entry.record().clone();
                self.current = Some(entry);
                Some(record)
            }
            _ => {
                self.finish();
                None
            }
        }
    }

    fn scan_type(&self) -> ScanType {
        self.scan
    }
}
