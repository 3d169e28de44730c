// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A sequence that maintains sort order on insert rather than accepting a caller-given
//! position.
//!
//! Backed by [`FenwickBase`], using its ordered-segment routing (`max`-bound candidate
//! selection, lower-bound splice) rather than positional insertion.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::Error;
use crate::fenwick_base::{FenwickBase, FenwickBaseMeta};
use crate::store::BlobStore;

/// A sorted sequence of values.
pub struct OrderedSequence<T, S> {
    base: FenwickBase<T, S>,
}

impl<T, S> OrderedSequence<T, S>
where
    T: Clone + Ord + Serialize + DeserializeOwned,
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

    /// Reads the value at global position `i`, or `None` if out of range.
    pub async fn get(&mut self, i: usize) -> Result<Option<T>, Error<S::Error>> {
        self.base.get(i).await
    }

    /// Value-range scan: every element in the half-open range `[lo, hi)`, in sorted order.
    pub async fn scan(&mut self, lo: &T, hi: &T) -> Result<Vec<T>, Error<S::Error>> {
        self.base.scan_values(lo, hi).await
    }

    /// Reads the half-open range `[lo, hi)` of global positions, in sorted order.
    pub async fn range(&mut self, lo: usize, hi: usize) -> Result<Vec<T>, Error<S::Error>> {
        self.base.range(lo, hi).await
    }

    /// Inserts `value`, keeping the sequence sorted. Returns the position it landed at.
    pub async fn insert(&mut self, value: T) -> Result<usize, Error<S::Error>> {
        self.base.insert_ordered(value).await
    }

    /// Returns the global position of `value`, or `None` if it isn't present.
    pub async fn get_index(&mut self, value: &T) -> Result<Option<usize>, Error<S::Error>> {
        self.base.index_of(value).await
    }

    /// Persists every segment touched since the last flush.
    pub async fn flush(&mut self) -> Result<(), Error<S::Error>> {
        self.base.flush().await
    }
}
