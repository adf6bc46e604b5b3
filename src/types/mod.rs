//! Shared identifier newtypes, the crate error enum, and the `Result` alias.

use std::fmt;
use std::io;

/// Identity of a stored record, assigned by the surrounding engine at
/// insertion time. Monotonic per space, never reused, and therefore usable
/// as the hidden tiebreaker when a nullable unique key needs a total order.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors surfaced by the index engine.
#[derive(thiserror::Error, Debug)]
pub enum MemtreeError {
    /// An underlying sink failed while streaming a checkpoint.
    #[error("I/O: {0}")]
    Io(#[from] io::Error),
    /// Extent or staging-buffer allocation failed. The in-progress operation
    /// is abandoned and the container is left exactly as it was.
    #[error("out of memory: failed to allocate {requested} bytes in {subsystem}::{operation}")]
    OutOfMemory {
        /// Bytes the failed allocation asked for.
        requested: usize,
        /// Component that made the request.
        subsystem: &'static str,
        /// Operation in flight when the request failed.
        operation: &'static str,
    },
    /// A unique constraint rejected the new record and the container was
    /// rolled back to its pre-call state.
    #[error("duplicate key in unique index '{index}' of space '{space}'")]
    DuplicateKey {
        /// Name of the violated index.
        index: String,
        /// Name of the space containing the index.
        space: String,
    },
    /// Replace-only mode found no record to replace.
    #[error("record to replace not found in index '{index}' of space '{space}'")]
    NotFound {
        /// Name of the index that was searched.
        index: String,
        /// Name of the space containing the index.
        space: String,
    },
    /// A malformed argument or payload.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// A decoded payload did not match its declared layout.
    #[error("corruption: {0}")]
    Corruption(&'static str),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, MemtreeError>;
