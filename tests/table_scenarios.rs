// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! End-to-end scenarios exercising the engine's public surface against [`MemoryStore`],
//! mirroring the house style of colocated unit tests for the algorithmic core plus a
//! top-level integration suite for whole-table behavior.

use std::collections::BTreeMap;
use std::sync::Arc;

use fenwick_tsdb::{
    BlobStore, IndexedSequence, MemoryStore, OrderedSequence, Table, TableConfig, Value, ValueType,
};

fn row(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs.iter().map(|(k, v)| ((*k).to_owned(), v.clone())).collect()
}

/// Indexed splicing: a sequence of `insert_at` calls composes like repeated array splices.
#[tokio::test]
async fn indexed_splicing() {
    let mut seq = IndexedSequence::<i32, _>::new(MemoryStore::new(), "seq", 64, 16);
    seq.insert_at(0, 2).await.unwrap();
    seq.insert_at(0, 1).await.unwrap();
    seq.insert_at(2, 4).await.unwrap();
    seq.insert_at(2, 3).await.unwrap();
    assert_eq!(seq.range(0, 4).await.unwrap(), vec![1, 2, 3, 4]);
}

/// Ordered scan: value-range `scan` over an out-of-order insertion sequence.
#[tokio::test]
async fn ordered_scan() {
    let mut seq = OrderedSequence::<i32, _>::new(MemoryStore::new(), "seq", 64, 16);
    for v in [10, 2, 7, 5, 1, 3, 9, 6, 4, 8] {
        seq.insert(v).await.unwrap();
    }
    assert_eq!(seq.scan(&3, &7).await.unwrap(), vec![3, 4, 5, 6]);
    assert_eq!(seq.scan(&5, &5).await.unwrap(), Vec::<i32>::new());
    assert_eq!(seq.scan(&5, &6).await.unwrap(), vec![5]);
}

/// Ordered duplicates: equal values land adjacent, in insertion order among themselves.
#[tokio::test]
async fn ordered_duplicates() {
    let mut seq = OrderedSequence::<i32, _>::new(MemoryStore::new(), "seq", 64, 16);
    for v in [2, 2, 2, 1, 1, 3] {
        seq.insert(v).await.unwrap();
    }
    assert_eq!(seq.range(0, seq.len()).await.unwrap(), vec![1, 1, 2, 2, 2, 3]);
    assert_eq!(seq.scan(&2, &3).await.unwrap(), vec![2, 2, 2]);
}

/// Split copy-on-write: overwriting one segment's slot rewrites only its chunk's key,
/// leaving sibling chunk keys byte-identical, and a rehydrated sequence observes the
/// overwritten value.
#[tokio::test]
async fn split_copy_on_write() {
    let store = Arc::new(MemoryStore::new());
    let mut seq = IndexedSequence::<i32, _>::new(store.clone(), "seq", 4, 2);
    for i in 0..15 {
        seq.insert_at(i, i as i32).await.unwrap();
    }
    seq.flush().await.unwrap();
    let meta_before = seq.meta();

    // Overwrite position 0 by removing and reinserting (no update-in-place primitive
    // exists at this layer, per the Non-goals; this exercises the chunk-level CoW path
    // the same way a real overwrite-via-reinsert workflow would).
    let mut seq = IndexedSequence::<i32, _>::hydrate(store.clone(), "seq", meta_before.clone());
    seq.insert_at(0, -1).await.unwrap();
    seq.flush().await.unwrap();
    let meta_after = seq.meta();

    assert_ne!(meta_before.chunks[0], meta_after.chunks[0]);
    assert_eq!(meta_before.chunks[1], meta_after.chunks[1]);

    let mut rehydrated = IndexedSequence::<i32, _>::hydrate(store, "seq", meta_after);
    let mut expected: Vec<i32> = (0..16).collect();
    expected[0] = -1;
    assert_eq!(rehydrated.range(0, rehydrated.len()).await.unwrap(), expected);
}

/// Table alignment with dynamic columns: a row mentioning a column the other row omits
/// leaves that column `None` (absent from the assembled row) at the omitting row's
/// position, and vice versa.
#[tokio::test]
async fn table_alignment_with_dynamic_columns() {
    let mut table = Table::new(
        Arc::new(MemoryStore::new()),
        "t",
        TableConfig::new("id", ValueType::Number),
    );

    table
        .insert(vec![row(&[
            ("id", Value::Number(2.0)),
            ("name", Value::String("bob".into())),
        ])])
        .await
        .unwrap();
    table
        .insert(vec![row(&[("id", Value::Number(1.0)), ("score", Value::Number(10.0))])])
        .await
        .unwrap();

    let rows = table.range(0, None).await.unwrap();
    assert_eq!(rows.len(), 2);

    assert_eq!(rows[0].get("id"), Some(&Value::Number(1.0)));
    assert_eq!(rows[0].get("score"), Some(&Value::Number(10.0)));
    assert_eq!(rows[0].get("name"), None);

    assert_eq!(rows[1].get("id"), Some(&Value::Number(2.0)));
    assert_eq!(rows[1].get("name"), Some(&Value::String("bob".into())));
    assert_eq!(rows[1].get("score"), None);
}

/// Atomic flush rollback: if a column's flush fails, the store's committed meta snapshot
/// is left exactly as it was, and `getMeta()` still reports the previous commit.
#[tokio::test]
async fn atomic_flush_rollback() {
    struct FailOnceStore {
        inner: MemoryStore,
        armed: std::sync::atomic::AtomicBool,
    }

    #[derive(Debug)]
    struct Boom;
    impl std::fmt::Display for Boom {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "boom")
        }
    }

    impl BlobStore for FailOnceStore {
        type Error = Boom;

        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Error> {
            Ok(self.inner.get(key).await.unwrap())
        }

        async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), Self::Error> {
            if self.armed.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(Boom);
            }
            self.inner.set(key, value).await.unwrap();
            Ok(())
        }
    }

    let store = Arc::new(FailOnceStore {
        inner: MemoryStore::new(),
        armed: std::sync::atomic::AtomicBool::new(false),
    });

    let mut table = Table::new(store.clone(), "t", TableConfig::new("id", ValueType::Number));
    table
        .insert(vec![row(&[("id", Value::Number(1.0)), ("name", Value::String("a".into()))])])
        .await
        .unwrap();
    table.flush("meta").await.unwrap();
    let v1 = table.meta();

    table
        .insert(vec![row(&[("id", Value::Number(2.0)), ("name", Value::String("b".into()))])])
        .await
        .unwrap();

    store.armed.store(true, std::sync::atomic::Ordering::SeqCst);
    assert!(table.flush("meta").await.is_err());

    assert_eq!(table.meta().order.segments.len(), v1.order.segments.len());
    let stored = store.inner.get("meta").await.unwrap().unwrap();
    let stored_meta: fenwick_tsdb::TableMeta = bincode::deserialize(&stored).unwrap();
    assert_eq!(stored_meta.order.segments.len(), v1.order.segments.len());
}

/// Round-trip: a table flushed then loaded fresh from the store returns the same sorted
/// rows, across several segment splits.
#[tokio::test]
async fn table_flush_and_reload_round_trip() {
    let store = Arc::new(MemoryStore::new());
    let config = TableConfig::new("id", ValueType::Number).segment_count(4).chunk_count(2);

    let mut table = Table::new(store.clone(), "metrics", config.clone());
    let ids = [50, 10, 30, 20, 40, 5, 45, 15, 35, 25];
    for id in ids {
        table
            .insert(vec![row(&[
                ("id", Value::Number(f64::from(id))),
                ("label", Value::String(format!("m{id}"))),
            ])])
            .await
            .unwrap();
    }
    table.flush("metrics.meta").await.unwrap();

    let mut reloaded = Table::load(store, "metrics", config, "metrics.meta").await.unwrap();
    let rows = reloaded.range(0, None).await.unwrap();
    let ids: Vec<i64> = rows
        .iter()
        .map(|r| match r.get("id") {
            Some(Value::Number(n)) => *n as i64,
            _ => panic!("expected a number"),
        })
        .collect();
    assert_eq!(ids, vec![5, 10, 15, 20, 25, 30, 35, 40, 45, 50]);
    assert_eq!(rows[0].get("label"), Some(&Value::String("m5".into())));
}

/// `chunk_count == 0` is normalized to 1 (one segment per chunk), matching the original
/// source's documented behavior.
#[tokio::test]
async fn zero_chunk_count_normalizes_to_one() {
    let config = TableConfig::new("id", ValueType::Number).chunk_count(0);
    assert_eq!(config.sequence_config().chunk_count, 1);
}
