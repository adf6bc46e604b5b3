//! Helpers shared by the integration suites.
#![allow(dead_code)]

use std::sync::Arc;

use memtree::index::def::{
    DupReplaceMode, FieldType, IndexDef, IndexOpts, KeyDef, KeyPart, ScanType,
};
use memtree::index::tree::HeapAllocator;
use memtree::index::{open_tree_index, Index};
use memtree::record::{Record, RecordRef, Value};
use memtree::types::RecordId;

/// Single integer-keyed index definition.
pub fn int_def(unique: bool, use_hints: bool) -> IndexDef {
    IndexDef::new(
        "primary",
        "items",
        IndexOpts { unique, use_hints },
        KeyDef::new(vec![KeyPart::new(0, FieldType::Integer)]),
    )
}

/// Opens an unlimited-memory integer index.
pub fn open_int_index(unique: bool) -> Box<dyn Index> {
    open_tree_index(int_def(unique, true), Arc::new(HeapAllocator::unlimited()))
}

/// Record with one integer key field.
pub fn rec(id: u64, key: i64) -> RecordRef {
    Record::new(RecordId(id), vec![Value::Int(key)])
}

/// Inserts a fresh record, panicking on any constraint violation.
pub fn insert(index: &mut Box<dyn Index>, id: u64, key: i64) -> RecordRef {
    let record = rec(id, key);
    index
        .replace(None, Some(&record), DupReplaceMode::Insert)
        .expect("insert");
    record
}

/// First field of a record as an integer.
pub fn key_of(record: &RecordRef) -> i64 {
    match record.field(0) {
        Some(Value::Int(v)) => *v,
        other => panic!("integer key expected, got {other:?}"),
    }
}

/// Runs one scan to exhaustion and returns the integer keys it yielded.
pub fn scan_keys(index: &dyn Index, scan: ScanType, key: &[Value]) -> Vec<i64> {
    let mut it = index.iterator();
    it.init(scan, key).expect("init");
    std::iter::from_fn(|| it.next()).map(|r| key_of(&r)).collect()
}
