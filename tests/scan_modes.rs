//! Scan-mode coverage: every iterator kind over unique and non-unique
//! indexes, keyless degradation, and partial keys on composite indexes.

mod common;

use std::sync::Arc;

use common::{insert, open_int_index, scan_keys};
use memtree::index::def::{
    Collation, DupReplaceMode, FieldType, IndexDef, IndexOpts, KeyDef, KeyPart, ScanType,
};
use memtree::index::tree::HeapAllocator;
use memtree::index::open_tree_index;
use memtree::record::{Record, Value};
use memtree::types::RecordId;

#[test]
fn basic_insert_find_and_full_scan() {
    let mut index = open_int_index(true);
    for (id, key) in [(1u64, 5i64), (2, 1), (3, 3)] {
        insert(&mut index, id, key);
    }
    assert_eq!(index.len(), 3);
    assert_eq!(scan_keys(index.as_ref(), ScanType::All, &[]), vec![1, 3, 5]);

    let found = index.find_unique(&[Value::Int(3)]);
    assert_eq!(found.expect("present").id(), RecordId(3));
    assert!(index.find_unique(&[Value::Int(4)]).is_none());
    assert_eq!(scan_keys(index.as_ref(), ScanType::Eq, &[Value::Int(4)]), Vec::<i64>::new());
}

#[test]
fn range_scans_on_unique_index() {
    let mut index = open_int_index(true);
    for key in [10i64, 20, 30, 40, 50] {
        insert(&mut index, key as u64, key);
    }
    let k = |v: i64| [Value::Int(v)];

    assert_eq!(scan_keys(index.as_ref(), ScanType::Ge, &k(30)), vec![30, 40, 50]);
    assert_eq!(scan_keys(index.as_ref(), ScanType::Ge, &k(31)), vec![40, 50]);
    assert_eq!(scan_keys(index.as_ref(), ScanType::Gt, &k(30)), vec![40, 50]);
    assert_eq!(scan_keys(index.as_ref(), ScanType::Le, &k(30)), vec![30, 20, 10]);
    assert_eq!(scan_keys(index.as_ref(), ScanType::Le, &k(29)), vec![20, 10]);
    assert_eq!(scan_keys(index.as_ref(), ScanType::Lt, &k(30)), vec![20, 10]);
    assert_eq!(scan_keys(index.as_ref(), ScanType::Eq, &k(30)), vec![30]);
    assert_eq!(scan_keys(index.as_ref(), ScanType::Req, &k(30)), vec![30]);

    // Off both ends.
    assert_eq!(scan_keys(index.as_ref(), ScanType::Gt, &k(50)), Vec::<i64>::new());
    assert_eq!(scan_keys(index.as_ref(), ScanType::Lt, &k(10)), Vec::<i64>::new());
    assert_eq!(scan_keys(index.as_ref(), ScanType::Ge, &k(55)), Vec::<i64>::new());
    assert_eq!(scan_keys(index.as_ref(), ScanType::Le, &k(5)), Vec::<i64>::new());
}

#[test]
fn equality_runs_on_non_unique_index() {
    let mut index = open_int_index(false);
    for (id, key) in [(1u64, 10i64), (2, 20), (3, 20), (4, 20), (5, 30)] {
        insert(&mut index, id, key);
    }
    let k = [Value::Int(20)];

    // EQ walks the run ascending, REQ descending, both stopping at the
    // run's edge rather than spilling into neighbouring keys.
    assert_eq!(scan_keys(index.as_ref(), ScanType::Eq, &k), vec![20, 20, 20]);
    assert_eq!(scan_keys(index.as_ref(), ScanType::Req, &k), vec![20, 20, 20]);

    let mut it = index.iterator();
    it.init(ScanType::Eq, &k).expect("init");
    let ids: Vec<u64> = std::iter::from_fn(|| it.next()).map(|r| r.id().0).collect();
    assert_eq!(ids, vec![2, 3, 4], "ascending by insertion identity");

    it.init(ScanType::Req, &k).expect("re-init reuses the iterator");
    let ids: Vec<u64> = std::iter::from_fn(|| it.next()).map(|r| r.id().0).collect();
    assert_eq!(ids, vec![4, 3, 2], "descending by insertion identity");
}

#[test]
fn keyless_scans_degrade_to_full_scans() {
    let mut index = open_int_index(true);
    for key in [2i64, 1, 3] {
        insert(&mut index, key as u64, key);
    }
    assert_eq!(scan_keys(index.as_ref(), ScanType::Eq, &[]), vec![1, 2, 3]);
    assert_eq!(scan_keys(index.as_ref(), ScanType::Ge, &[]), vec![1, 2, 3]);
    assert_eq!(scan_keys(index.as_ref(), ScanType::Req, &[]), vec![3, 2, 1]);
    assert_eq!(scan_keys(index.as_ref(), ScanType::Le, &[]), vec![3, 2, 1]);

    let mut it = index.iterator();
    it.init(ScanType::Eq, &[]).expect("init");
    assert_eq!(it.scan_type(), ScanType::Ge, "keyless equality becomes a forward scan");
    it.init(ScanType::Req, &[]).expect("init");
    assert_eq!(it.scan_type(), ScanType::Le, "keyless reverse equality becomes a backward scan");
}

#[test]
fn empty_index_yields_nothing_in_every_mode() {
    let index = open_int_index(true);
    for scan in [
        ScanType::All,
        ScanType::Eq,
        ScanType::Req,
        ScanType::Ge,
        ScanType::Gt,
        ScanType::Le,
        ScanType::Lt,
    ] {
        assert_eq!(scan_keys(index.as_ref(), scan, &[Value::Int(1)]), Vec::<i64>::new());
        assert_eq!(scan_keys(index.as_ref(), scan, &[]), Vec::<i64>::new());
    }
}

#[test]
fn partial_key_over_composite_index() {
    let def = IndexDef::new(
        "composite",
        "items",
        IndexOpts {
            unique: true,
            use_hints: true,
        },
        KeyDef::new(vec![
            KeyPart::new(0, FieldType::Integer),
            KeyPart::new(1, FieldType::String),
        ]),
    );
    let mut index = open_tree_index(def, Arc::new(HeapAllocator::unlimited()));
    let mut id = 0u64;
    for major in [1i64, 2, 3] {
        for minor in ["a", "b"] {
            id += 1;
            let record = Record::new(
                RecordId(id),
                vec![Value::Int(major), Value::Str(minor.into())],
            );
            index
                .replace(None, Some(&record), DupReplaceMode::Insert)
                .expect("insert");
        }
    }

    // A one-part key matches the whole (2, *) run.
    let mut it = index.iterator();
    it.init(ScanType::Eq, &[Value::Int(2)]).expect("init");
    let matched: Vec<String> = std::iter::from_fn(|| it.next())
        .map(|r| match r.field(1) {
            Some(Value::Str(s)) => s.clone(),
            other => panic!("string expected, got {other:?}"),
        })
        .collect();
    assert_eq!(matched, vec!["a", "b"]);

    it.init(ScanType::Gt, &[Value::Int(2)]).expect("init");
    let majors: Vec<i64> = std::iter::from_fn(|| it.next())
        .map(|r| match r.field(0) {
            Some(Value::Int(v)) => *v,
            other => panic!("int expected, got {other:?}"),
        })
        .collect();
    assert_eq!(majors, vec![3, 3]);

    let err = it
        .init(ScanType::Eq, &[Value::Int(1), Value::Str("a".into()), Value::Int(9)])
        .expect_err("key longer than the index");
    assert!(matches!(err, memtree::MemtreeError::Invalid(_)));
}

#[test]
fn case_insensitive_index_matches_any_spelling() {
    let def = IndexDef::new(
        "by_name",
        "items",
        IndexOpts {
            unique: true,
            use_hints: false,
        },
        KeyDef::new(vec![
            KeyPart::new(0, FieldType::String).with_collation(Collation::CaseInsensitive),
        ]),
    );
    let mut index = open_tree_index(def, Arc::new(HeapAllocator::unlimited()));
    for (id, name) in [(1u64, "Apple"), (2, "banana"), (3, "Cherry")] {
        let record = Record::new(RecordId(id), vec![Value::Str(name.into())]);
        index
            .replace(None, Some(&record), DupReplaceMode::Insert)
            .expect("insert");
    }

    // A lookup key in any case hits the stored spelling.
    let found = index.find_unique(&[Value::Str("aPpLe".into())]);
    assert_eq!(found.expect("present").id(), RecordId(1));

    let mut it = index.iterator();
    it.init(ScanType::Eq, &[Value::Str("CHERRY".into())]).expect("init");
    assert_eq!(it.next().map(|r| r.id().0), Some(3));
    assert!(it.next().is_none());
}

#[test]
fn random_sampling_is_seed_deterministic() {
    let mut index = open_int_index(true);
    assert!(index.random(7).is_none());
    for key in 0..64i64 {
        insert(&mut index, key as u64, key);
    }
    let a = index.random(42).expect("non-empty");
    let b = index.random(42).expect("non-empty");
    assert_eq!(a.id(), b.id());
}
