// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A positional sequence: values are addressed by index, not by sort order.
//!
//! Backed directly by [`FenwickBase`] — an indexed sequence never touches the ordered-only
//! `min`/`max` bookkeeping on segments, it just inserts and reads by position.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::Error;
use crate::fenwick_base::{FenwickBase, FenwickBaseMeta};
use crate::store::BlobStore;

/// A sequence of values addressed purely by position.
pub struct IndexedSequence<T, S> {
    base: FenwickBase<T, S>,
}

impl<T, S> IndexedSequence<T, S>
where
    T: Clone + Serialize + DeserializeOwned,
    S: BlobStore,
{
    /// Creates a fresh, empty sequence.
    pub fn new(store: S, namespace: impl Into<String>, segment_capacity: usize, chunk_capacity: usize) -> Self {
        Self {
            base: FenwickBase::new(store, namespace, segment_capacity, chunk_capacity),
        }
    }

    /// Rehydrates a sequence from a persisted snapshot.
    pub fn hydrate(store: S, namespace: impl Into<String>, meta: FenwickBaseMeta<T>) -> Self {
        Self {
            base: FenwickBase::hydrate(store, namespace, meta),
        }
    }

    /// Builds the persisted snapshot of this sequence's current state.
    #[must_use]
    pub fn meta(&self) -> FenwickBaseMeta<T> {
        self.base.meta()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.base.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.base.is_empty()
    }

    /// Reads the value at position `i`, or `None` if out of range.
    pub async fn get(&mut self, i: usize) -> Result<Option<T>, Error<S::Error>> {
        self.base.get(i).await
    }

    /// Reads the half-open range `[lo, hi)`.
    pub async fn range(&mut self, lo: usize, hi: usize) -> Result<Vec<T>, Error<S::Error>> {
        self.base.range(lo, hi).await
    }

    /// Inserts `value` at position `i`, shifting everything at or after `i` one place to
    /// the right. `i` is clamped to the sequence's current length (an append).
    pub async fn insert_at(&mut self, i: usize, value: T) -> Result<(), Error<S::Error>> {
        self.base.insert_at(i, value).await
    }

    /// Inserts many `(original_index, value)` pairs against the sequence's pre-call shape
    /// in one call, without a waterfall of rebuilds — see [`FenwickBase::insert_many_at`].
    pub async fn insert_many_at(&mut self, pairs: Vec<(usize, T)>) -> Result<(), Error<S::Error>> {
        self.base.insert_many_at(pairs).await
    }

    /// Persists every segment touched since the last flush.
    pub async fn flush(&mut self) -> Result<(), Error<S::Error>> {
        self.base.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn insert_at_shifts_subsequent_values() {
        let mut seq = IndexedSequence::<i32, _>::new(MemoryStore::new(), "t", 4, 2);
        for i in 0..5 {
            seq.insert_at(i, i as i32).await.unwrap();
        }
        seq.insert_at(2, 99).await.unwrap();
        assert_eq!(seq.range(0, 6).await.unwrap(), vec![0, 1, 99, 2, 3, 4]);
    }

    #[tokio::test]
    async fn insert_many_at_preserves_given_relative_order() {
        let mut seq = IndexedSequence::<i32, _>::new(MemoryStore::new(), "t", 1000, 4);
        seq.insert_at(0, 1).await.unwrap();
        seq.insert_at(1, 2).await.unwrap();
        seq.insert_at(2, 3).await.unwrap();

        // Insert 10 and 20 both "before" index 1 in the original array; 10 must land
        // before 20 since it appears first in the batch.
        seq.insert_many_at(vec![(1, 10), (1, 20)]).await.unwrap();
        assert_eq!(seq.range(0, seq.len()).await.unwrap(), vec![1, 10, 20, 2, 3]);
    }

    #[tokio::test]
    async fn flush_then_hydrate_round_trips() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let mut seq = IndexedSequence::<i32, _>::new(store.clone(), "t", 3, 2);
        for i in 0..10 {
            seq.insert_at(i, i as i32).await.unwrap();
        }
        seq.flush().await.unwrap();
        let meta = seq.meta();

        let mut hydrated = IndexedSequence::<i32, _>::hydrate(store, "t", meta);
        assert_eq!(hydrated.len(), 10);
        assert_eq!(hydrated.range(0, 10).await.unwrap(), (0..10).collect::<Vec<_>>());
    }
}
