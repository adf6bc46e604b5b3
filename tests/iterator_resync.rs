//! Iterator behaviour under concurrent mutation: positions go stale when the
//! tree changes underneath them, and the iterator must resume at the correct
//! neighbour without skipping or repeating records.

mod common;

use common::{insert, key_of, open_int_index, rec, scan_keys};
use memtree::index::def::{DupReplaceMode, ScanType};
use memtree::record::Value;

#[test]
fn forward_scan_survives_deleting_the_returned_record() {
    let mut index = open_int_index(true);
    let records: Vec<_> = (0..100i64).map(|k| insert(&mut index, k as u64, k)).collect();

    let mut it = index.iterator();
    it.init(ScanType::All, &[]).expect("init");
    let mut seen = Vec::new();
    while let Some(r) = it.next() {
        let key = match r.field(0) {
            Some(Value::Int(v)) => *v,
            _ => unreachable!(),
        };
        seen.push(key);
        // Remove the record we just got; the next step must re-sync.
        index
            .replace(Some(&records[key as usize]), None, DupReplaceMode::Insert)
            .expect("delete under iterator");
    }
    assert_eq!(seen, (0..100).collect::<Vec<_>>());
    assert_eq!(index.len(), 0);
}

#[test]
fn backward_scan_survives_deleting_the_returned_record() {
    let mut index = open_int_index(true);
    let records: Vec<_> = (0..100i64).map(|k| insert(&mut index, k as u64, k)).collect();

    let mut it = index.iterator();
    it.init(ScanType::Le, &[Value::Int(99)]).expect("init");
    let mut seen = Vec::new();
    while let Some(r) = it.next() {
        let key = match r.field(0) {
            Some(Value::Int(v)) => *v,
            _ => unreachable!(),
        };
        seen.push(key);
        index
            .replace(Some(&records[key as usize]), None, DupReplaceMode::Insert)
            .expect("delete under iterator");
    }
    assert_eq!(seen, (0..100).rev().collect::<Vec<_>>());
}

#[test]
fn deleting_the_upcoming_record_skips_it_cleanly() {
    let mut index = open_int_index(true);
    let records: Vec<_> = (0..10i64).map(|k| insert(&mut index, k as u64, k)).collect();

    let mut it = index.iterator();
    it.init(ScanType::All, &[]).expect("init");
    assert_eq!(it.next().map(|r| r.id().0), Some(0));

    // Delete the element the iterator would visit next.
    index
        .replace(Some(&records[1]), None, DupReplaceMode::Insert)
        .expect("delete");
    assert_eq!(it.next().map(|r| r.id().0), Some(2), "1 is gone, 2 follows");
}

#[test]
fn records_inserted_ahead_become_visible() {
    let mut index = open_int_index(true);
    for k in [10i64, 20, 30] {
        insert(&mut index, k as u64, k);
    }

    let mut it = index.iterator();
    it.init(ScanType::All, &[]).expect("init");
    assert_eq!(it.next().map(|r| r.id().0), Some(10));

    // 15 lands between the current position and the rest of the scan.
    insert(&mut index, 15, 15);
    let rest: Vec<u64> = std::iter::from_fn(|| it.next()).map(|r| r.id().0).collect();
    assert_eq!(rest, vec![15, 20, 30]);
}

#[test]
fn mutations_between_init_and_the_first_step_are_honored() {
    let mut index = open_int_index(true);
    let records: Vec<_> = (0..3i64).map(|k| insert(&mut index, k as u64, k)).collect();

    // A record deleted after init but before the first step must not come
    // back; the scan opens against the tree as it stands on that step.
    let mut it = index.iterator();
    it.init(ScanType::All, &[]).expect("init");
    index
        .replace(Some(&records[0]), None, DupReplaceMode::Insert)
        .expect("delete before first step");
    assert_eq!(it.next().map(|r| r.id().0), Some(1));

    // Likewise a record inserted below the scan's opening bound is seen.
    it.init(ScanType::All, &[]).expect("re-init");
    insert(&mut index, 100, -5);
    let keys: Vec<i64> = std::iter::from_fn(|| it.next()).map(|r| key_of(&r)).collect();
    assert_eq!(keys, vec![-5, 1, 2]);

    // An equality scan armed for a key that only appears later still hits.
    it.init(ScanType::Eq, &[Value::Int(7)]).expect("init eq");
    insert(&mut index, 7, 7);
    assert_eq!(it.next().map(|r| key_of(&r)), Some(7));
    assert!(it.next().is_none());
}

#[test]
fn heavy_churn_around_the_cursor() {
    let mut index = open_int_index(true);
    let records: Vec<_> = (0..200i64)
        .map(|k| insert(&mut index, k as u64, 2 * k))
        .collect();

    // Walk even keys while deleting behind the cursor and inserting odd
    // keys ahead of it.
    let mut it = index.iterator();
    it.init(ScanType::Ge, &[Value::Int(0)]).expect("init");
    let mut seen = Vec::new();
    let mut next_odd = 1i64;
    while let Some(r) = it.next() {
        let key = match r.field(0) {
            Some(Value::Int(v)) => *v,
            _ => unreachable!(),
        };
        seen.push(key);
        if key % 2 == 0 {
            let idx = (key / 2) as usize;
            index
                .replace(Some(&records[idx]), None, DupReplaceMode::Insert)
                .expect("delete behind");
        }
        if next_odd < key + 20 && next_odd < 399 {
            let odd = rec(1000 + next_odd as u64, next_odd);
            index
                .replace(None, Some(&odd), DupReplaceMode::Insert)
                .expect("insert ahead");
            next_odd += 2;
        }
    }
    // Everything originally present was visited, in order.
    let evens: Vec<i64> = seen.iter().copied().filter(|k| k % 2 == 0).collect();
    assert_eq!(evens, (0..200).map(|k| 2 * k).collect::<Vec<_>>());
    let mut sorted = seen.clone();
    sorted.sort_unstable();
    sorted.dedup();
    assert_eq!(seen, sorted, "no record repeated, order preserved");
}

#[test]
fn equality_run_ends_even_after_run_mutation() {
    let mut index = open_int_index(false);
    let twenties: Vec<_> = (0..5u64).map(|id| {
        let r = rec(id + 10, 20);
        index
            .replace(None, Some(&r), DupReplaceMode::Insert)
            .expect("insert");
        r
    }).collect();
    insert(&mut index, 1, 10);
    insert(&mut index, 2, 30);

    let mut it = index.iterator();
    it.init(ScanType::Eq, &[Value::Int(20)]).expect("init");
    assert!(it.next().is_some());
    // Remove the rest of the run; the scan must stop rather than wander
    // into the 30 key.
    for r in &twenties[1..] {
        index
            .replace(Some(r), None, DupReplaceMode::Insert)
            .expect("delete");
    }
    assert!(it.next().is_none());
}

#[test]
fn emptied_index_finishes_any_scan() {
    let mut index = open_int_index(true);
    let a = insert(&mut index, 1, 1);
    let b = insert(&mut index, 2, 2);

    let mut it = index.iterator();
    it.init(ScanType::All, &[]).expect("init");
    assert!(it.next().is_some());
    for r in [&a, &b] {
        index
            .replace(Some(r), None, DupReplaceMode::Insert)
            .expect("delete");
    }
    assert!(it.next().is_none());
    assert!(it.next().is_none(), "exhausted iterator stays exhausted");
    assert_eq!(scan_keys(index.as_ref(), ScanType::All, &[]), Vec::<i64>::new());
}
