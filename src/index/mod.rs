//! Index surface: definitions, comparison machinery, the access traits the
//! engine programs against, and the tree implementation behind them.

pub mod def;
pub mod key;
pub mod tree;

use std::sync::Arc;

use def::{DupReplaceMode, IndexDef, ScanType};
use key::{HintedEntry, PlainEntry};
use tree::{ExtentAllocator, TreeIndex};

use crate::record::{RecordRef, Value};
use crate::types::Result;

/// An ordered index over stored records.
pub trait Index: Send + Sync {
    /// The definition this index was opened with.
    fn def(&self) -> &IndexDef;

    /// Number of records currently indexed.
    fn len(&self) -> usize;

    /// Bytes of node memory in use, including memory pinned by snapshots.
    fn bytes_used(&self) -> usize;

    /// Point lookup by full key.
    ///
    /// # Panics
    ///
    /// Calling this on a non-unique index, or with a partial key, is a
    /// caller contract breach and aborts rather than misreporting a miss.
    fn find_unique(&self, key: &[Value]) -> Option<RecordRef>;

    /// An arbitrary record chosen deterministically from `seed`.
    fn random(&self, seed: u64) -> Option<RecordRef>;

    /// Applies one replacement: removes `old` (when given), inserts `new`
    /// (when given), enforcing `mode` against whatever equal-keyed record
    /// the insert displaces. Returns the record the operation removed from
    /// the index, if any. On a constraint violation the index is left
    /// exactly as it was.
    fn replace(
        &mut self,
        old: Option<&RecordRef>,
        new: Option<&RecordRef>,
        mode: DupReplaceMode,
    ) -> Result<Option<RecordRef>>;

    /// Allocates a reusable scan iterator. The iterator starts dead and must
    /// be positioned with [`IndexIterator::init`].
    fn iterator(&self) -> Box<dyn IndexIterator>;

    /// Starts a bulk build. The index must be empty.
    fn begin_build(&mut self);

    /// Pre-sizes the build staging for `additional` more records.
    fn reserve(&mut self, additional: usize) -> Result<()>;

    /// Stages one record into the active build.
    fn build_next(&mut self, record: &RecordRef) -> Result<()>;

    /// Sorts the staged records and assembles the index in one pass.
    fn end_build(&mut self) -> Result<()>;

    /// Freezes the current contents for a consistent checkpoint scan.
    fn snapshot(&mut self) -> Box<dyn SnapshotSource>;
}

/// A positioned scan over an index.
///
/// Iterators are tolerant of concurrent mutation: a step taken after the
/// record it stood on was removed resumes at the right neighbour instead of
/// failing, skipping nothing and repeating nothing.
pub trait IndexIterator: Send {
    /// (Re)arms the iterator for a scan of `scan` kind over `key`; the
    /// opening bound search runs on the first [`IndexIterator::next`]. An
    /// empty key degrades equality and range scans to full scans of the
    /// matching direction.
    fn init(&mut self, scan: ScanType, key: &[Value]) -> Result<()>;

    /// The next matching record, or `None` once the scan is exhausted.
    fn next(&mut self) -> Option<RecordRef>;

    /// The effective scan kind after keyless degradation.
    fn scan_type(&self) -> ScanType;
}

/// An ordered stream over the records captured by one index snapshot.
pub trait SnapshotSource: Send {
    /// The next record in index order.
    fn next_record(&mut self) -> Option<RecordRef>;

    /// Number of records the snapshot captured.
    fn record_count(&self) -> usize;

    /// The next record, already serialized for a checkpoint sink.
    fn next_bytes(&mut self) -> Option<Vec<u8>> {
        self.next_record().map(|r| r.encode())
    }
}

/// Opens a tree index for `def`, picking the hinted or plain entry layout
/// according to the definition's options.
pub fn open_tree_index(def: IndexDef, allocator: Arc<dyn ExtentAllocator>) -> Box<dyn Index> {
    if def.opts.use_hints {
        Box::new(TreeIndex::<HintedEntry>::new(def, allocator))
    } else {
        Box::new(TreeIndex::<PlainEntry>::new(def, allocator))
    }
}
