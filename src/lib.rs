//! In-memory ordered index engine.
//!
//! The crate provides the tree-backed index of an embedded storage engine:
//! records live on the heap behind reference-counted handles, and each index
//! orders them by a declared key over extent-backed balanced tree nodes.
//! Iterators survive concurrent mutation by re-synchronizing on the element
//! they last returned; snapshots freeze the structure copy-on-write so a
//! checkpoint can stream a consistent view while writers proceed.
//!
//! ```
//! use std::sync::Arc;
//! use memtree::index::def::{
//!     DupReplaceMode, FieldType, IndexDef, IndexOpts, KeyDef, KeyPart, ScanType,
//! };
//! use memtree::index::open_tree_index;
//! use memtree::index::tree::HeapAllocator;
//! use memtree::record::{Record, Value};
//! use memtree::types::RecordId;
//!
//! let def = IndexDef::new(
//!     "primary",
//!     "items",
//!     IndexOpts { unique: true, use_hints: true },
//!     KeyDef::new(vec![KeyPart::new(0, FieldType::Integer)]),
//! );
//! let mut index = open_tree_index(def, Arc::new(HeapAllocator::unlimited()));
//! for (id, key) in [(1u64, 5i64), (2, 1), (3, 3)] {
//!     let record = Record::new(RecordId(id), vec![Value::Int(key)]);
//!     index.replace(None, Some(&record), DupReplaceMode::Insert).unwrap();
//! }
//! assert_eq!(index.len(), 3);
//!
//! let mut scan = index.iterator();
//! scan.init(ScanType::All, &[]).unwrap();
//! let keys: Vec<_> = std::iter::from_fn(|| scan.next())
//!     .map(|r| r.fields()[0].clone())
//!     .collect();
//! assert_eq!(keys, vec![Value::Int(1), Value::Int(3), Value::Int(5)]);
//! ```

pub mod checkpoint;
pub mod index;
pub mod logging;
pub mod record;
pub mod types;

pub use index::{open_tree_index, Index, IndexIterator, SnapshotSource};
pub use record::{Record, RecordRef, Value};
pub use types::{MemtreeError, RecordId, Result};
