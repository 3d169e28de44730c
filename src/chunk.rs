// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Groups of segments persisted together as a single blob.
//!
//! A chunk is a fixed-shape container of exactly `C` slots; slot `i` holds the value array
//! for segment `cidx * C + i`. Chunks are copy-on-write: a commit always writes a *new* key,
//! never mutating the blob at the old one, matching the "identity is generated fresh"
//! posture of the teacher's [`crate`]-external analogue, `GlobalSegmentId`. The actual
//! commit logic lives in [`crate::fenwick_base::FenwickBase::flush`], which writes every
//! dirty chunk concurrently via `join_all`; a single-chunk `&mut self` commit method would
//! force those writes to serialize, so this cache only exposes the building blocks
//! (`load`, `load_many`, `get`, `put`) that `flush` composes itself.

use crate::error::{CodecError, Error};
use crate::store::BlobStore;
use rand::Rng;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;

/// A fixed-shape container of `C` segment-value slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk<T> {
    slots: Vec<Option<Vec<T>>>,
}

impl<T> Chunk<T> {
    /// Builds a chunk of `c` empty slots.
    #[must_use]
    pub fn empty(c: usize) -> Self {
        Self {
            slots: (0..c).map(|_| None).collect(),
        }
    }

    /// Returns the value array for local slot `i`, or `None` if that slot has never been
    /// written (an empty array, per spec 4.2).
    #[must_use]
    pub fn slot(&self, i: usize) -> Option<&[T]> {
        self.slots.get(i).and_then(|s| s.as_deref())
    }

    /// Overwrites local slot `i` with `values`, leaving every other slot untouched.
    pub fn set_slot(&mut self, i: usize, values: Vec<T>) {
        if i < self.slots.len() {
            self.slots[i] = Some(values);
        }
    }
}

/// Generates a fresh, opaque chunk key unlikely to collide across commits: a per-sequence
/// namespace, a millisecond timestamp, and a random 64-bit suffix.
#[must_use]
pub fn chunk_key(namespace: &str, cidx: usize) -> String {
    let millis = crate::time::unix_timestamp().as_millis();
    let suffix: u64 = rand::rng().random();
    format!("{namespace}/chunk-{cidx}-{millis}-{suffix:016x}")
}

/// Per-sequence chunk cache and commit logic.
///
/// Private to each sequence (spec 5: "the chunk cache within a sequence is private").
pub(crate) struct ChunkCache<T> {
    cache: HashMap<usize, Chunk<T>>,
}

impl<T> Default for ChunkCache<T> {
    fn default() -> Self {
        Self {
            cache: HashMap::new(),
        }
    }
}

impl<T: Clone + Serialize + DeserializeOwned> ChunkCache<T> {
    /// Loads chunk `cidx`, using the cache if present, else fetching `key` from `store`
    /// (or synthesizing an all-empty chunk of `c` slots if `key` is `None`, or if the
    /// store has no value at `key` — a missing key is treated as empty content, per
    /// spec 4.3.3).
    pub async fn load<S: BlobStore>(
        &mut self,
        store: &S,
        cidx: usize,
        key: Option<&str>,
        c: usize,
    ) -> Result<&Chunk<T>, Error<S::Error>> {
        if !self.cache.contains_key(&cidx) {
            let chunk = match key {
                Some(k) => match store.get(k).await.map_err(Error::Store)? {
                    Some(bytes) => {
                        bincode::deserialize(&bytes).map_err(CodecError::from)?
                    }
                    None => Chunk::empty(c),
                },
                None => Chunk::empty(c),
            };
            self.cache.insert(cidx, chunk);
        }

        #[expect(clippy::expect_used, reason = "just inserted above if absent")]
        Ok(self.cache.get(&cidx).expect("chunk just loaded"))
    }

    /// Ensures every chunk index in `requests` is present in the cache, fetching whichever
    /// are missing. Distinct chunk indices are fetched concurrently via a single
    /// `join_all` — the no-waterfall property for multi-chunk reads (spec 5).
    ///
    /// `requests` may repeat chunk indices; duplicates are fetched once.
    pub async fn load_many<S: BlobStore>(
        &mut self,
        store: &S,
        requests: &[(usize, Option<String>)],
        c: usize,
    ) -> Result<(), Error<S::Error>> {
        let mut to_fetch: Vec<(usize, Option<String>)> = requests
            .iter()
            .filter(|(cidx, _)| !self.cache.contains_key(cidx))
            .cloned()
            .collect();
        to_fetch.sort_by_key(|(cidx, _)| *cidx);
        to_fetch.dedup_by_key(|(cidx, _)| *cidx);

        if to_fetch.is_empty() {
            return Ok(());
        }

        let fetches = to_fetch.iter().map(|(cidx, key)| async move {
            let bytes = match key {
                Some(k) => store.get(k).await,
                None => Ok(None),
            };
            (*cidx, bytes)
        });

        for (cidx, bytes) in futures::future::join_all(fetches).await {
            let bytes = bytes.map_err(Error::Store)?;
            let chunk = match bytes {
                Some(b) => bincode::deserialize(&b).map_err(CodecError::from)?,
                None => Chunk::empty(c),
            };
            self.cache.insert(cidx, chunk);
        }

        Ok(())
    }

    /// Returns the cached chunk for `cidx`, if present.
    pub(crate) fn get(&self, cidx: usize) -> Option<&Chunk<T>> {
        self.cache.get(&cidx)
    }

    /// Inserts (or replaces) the cached chunk for `cidx`.
    pub(crate) fn put(&mut self, cidx: usize, chunk: Chunk<T>) {
        self.cache.insert(cidx, chunk);
    }
}
