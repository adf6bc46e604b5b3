//! Tree index implementation: extent-backed storage, the balanced container,
//! scan iterators, bulk build, and frozen snapshots.

mod build;
mod container;
mod extent;
mod index;
mod iterator;
mod snapshot;

pub use extent::{ExtentAllocator, HeapAllocator, EXTENT_SIZE};
pub use index::TreeIndex;
pub use iterator::TreeIterator;
pub use snapshot::TreeSnapshot;
