//! Comparator machinery: full-order record comparison with the hidden
//! identity tiebreaker, partial search-key probes, and the optional
//! precomputed hint that short-circuits comparisons on the first key part.

use std::cmp::Ordering;

use crate::index::def::{Collation, IndexDef, KeyDef};
use crate::record::{Record, RecordRef, Value};

/// Comparison context shared by a tree and its iterators.
///
/// Wraps the user-visible key definition and, when the index is non-unique
/// or nullable-unique, extends the order with the record identity so every
/// live entry compares distinct. Several NULL-bearing keys in a unique
/// nullable index coexist precisely because of that extension.
#[derive(Clone, Debug)]
pub struct Comparator {
    key_def: KeyDef,
    tiebreak: bool,
    hint_collation: Collation,
    hint_field: usize,
}

impl Comparator {
    /// Builds the comparator an index of the given definition orders by.
    pub fn for_index(def: &IndexDef) -> Self {
        let first = &def.key_def.parts()[0];
        Self {
            key_def: def.key_def.clone(),
            tiebreak: def.needs_identity_tiebreak(),
            hint_collation: first.collation,
            hint_field: first.field,
        }
    }

    /// The user-visible key definition.
    pub fn key_def(&self) -> &KeyDef {
        &self.key_def
    }

    /// Full comparison of two records: every key part, then the identity
    /// tiebreaker when the definition requires one.
    pub fn compare_records(&self, a: &Record, b: &Record) -> Ordering {
        match self.key_def.compare_records(a, b) {
            Ordering::Equal if self.tiebreak => a.id().cmp(&b.id()),
            other => other,
        }
    }

    /// Comparison of a record against a partial search key. Partial keys
    /// never engage the tiebreaker: a record matching every supplied part
    /// compares equal.
    pub fn compare_with_key(&self, record: &Record, key: &[Value], part_count: usize) -> Ordering {
        self.key_def.compare_with_key(record, key, part_count)
    }

    /// Hint scalar for a record's first key part.
    pub fn record_hint(&self, record: &Record) -> u64 {
        value_hint(
            record.field(self.hint_field).unwrap_or(&Value::Null),
            self.hint_collation,
        )
    }

    /// Hint scalar for a search key, when it covers at least the first part.
    pub fn key_hint(&self, key: &[Value], part_count: usize) -> Option<u64> {
        if part_count == 0 {
            return None;
        }
        key.first().map(|v| value_hint(v, self.hint_collation))
    }
}

/// A search key prepared for bound lookups: the values, how many leading
/// parts they cover, and the precomputed hint when the tree variant uses one.
pub struct KeyProbe<'a> {
    /// Search key values.
    pub key: &'a [Value],
    /// Number of leading key parts covered.
    pub part_count: usize,
    /// Hint of the first key value, if prepared.
    pub hint: Option<u64>,
}

/// An element stored in the tree container. The two implementations are the
/// hinted and unhinted variants of the same structure; the hint is strictly
/// a comparison shortcut and never decides an ordering on its own.
pub trait IndexEntry: Clone + Send + Sync + 'static {
    /// Wraps a record handle, precomputing whatever the variant caches.
    fn new(record: RecordRef, cmp: &Comparator) -> Self;

    /// The underlying record handle.
    fn record(&self) -> &RecordRef;

    /// Full entry-to-entry comparison under `cmp`.
    fn compare(&self, other: &Self, cmp: &Comparator) -> Ordering;

    /// Comparison of this entry against a prepared search key.
    fn compare_with_probe(&self, probe: &KeyProbe<'_>, cmp: &Comparator) -> Ordering;

    /// Whether both entries wrap the very same stored record.
    fn same_record(&self, other: &Self) -> bool {
        self.record().id() == other.record().id()
    }
}

/// Entry without a cached hint; every comparison runs the full key walk.
#[derive(Clone, Debug)]
pub struct PlainEntry {
    record: RecordRef,
}

impl IndexEntry for PlainEntry {
    fn new(record: RecordRef, _cmp: &Comparator) -> Self {
        Self { record }
    }

    fn record(&self) -> &RecordRef {
        &self.record
    }

    fn compare(&self, other: &Self, cmp: &Comparator) -> Ordering {
        cmp.compare_records(&self.record, &other.record)
    }

    fn compare_with_probe(&self, probe: &KeyProbe<'_>, cmp: &Comparator) -> Ordering {
        cmp.compare_with_key(&self.record, probe.key, probe.part_count)
    }
}

/// Entry carrying an order-consistent scalar derived from the first key
/// part. Unequal hints decide the comparison outright; equal hints fall back
/// to the full key walk, so hint collisions only cost performance.
#[derive(Clone, Debug)]
pub struct HintedEntry {
    record: RecordRef,
    hint: u64,
}

impl IndexEntry for HintedEntry {
    fn new(record: RecordRef, cmp: &Comparator) -> Self {
        let hint = cmp.record_hint(&record);
        Self { record, hint }
    }

    fn record(&self) -> &RecordRef {
        &self.record
    }

    fn compare(&self, other: &Self, cmp: &Comparator) -> Ordering {
        match self.hint.cmp(&other.hint) {
            Ordering::Equal => cmp.compare_records(&self.record, &other.record),
            decided => decided,
        }
    }

    fn compare_with_probe(&self, probe: &KeyProbe<'_>, cmp: &Comparator) -> Ordering {
        if let Some(key_hint) = probe.hint {
            match self.hint.cmp(&key_hint) {
                Ordering::Equal => {}
                decided => return decided,
            }
        }
        cmp.compare_with_key(&self.record, probe.key, probe.part_count)
    }
}

/// Order-consistent 64-bit digest of a value: `hint(a) < hint(b)` implies
/// `a < b` for same-typed values, and `Null` maps to the minimum. Collisions
/// are resolved by the full comparison, never by the hint.
fn value_hint(value: &Value, collation: Collation) -> u64 {
    match value {
        Value::Null => 0,
        Value::Bool(b) => u64::from(*b),
        Value::Int(i) => (*i as u64) ^ (1 << 63),
        Value::Double(d) => {
            // Same adjustment total_cmp applies, shifted into u64 order.
            let bits = d.to_bits() as i64;
            let adjusted = bits ^ ((((bits >> 63) as u64) >> 1) as i64);
            (adjusted as u64) ^ (1 << 63)
        }
        Value::Str(s) => match collation {
            Collation::Binary => prefix_hint(s.as_bytes()),
            Collation::CaseInsensitive => {
                let mut folded = [0u8; 8];
                for (slot, byte) in folded.iter_mut().zip(s.bytes()) {
                    *slot = byte.to_ascii_lowercase();
                }
                u64::from_be_bytes(folded)
            }
        },
        Value::Bytes(b) => prefix_hint(b),
    }
}

fn prefix_hint(bytes: &[u8]) -> u64 {
    let mut packed = [0u8; 8];
    let take = bytes.len().min(8);
    packed[..take].copy_from_slice(&bytes[..take]);
    u64::from_be_bytes(packed)
}
