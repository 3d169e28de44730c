// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The segmented, Fenwick-indexed, chunk-persisted substrate shared by
//! [`crate::indexed_sequence::IndexedSequence`] and [`crate::ordered_sequence::OrderedSequence`].
//!
//! A segment's owning chunk slot is derived from its *current position* in the segment
//! list (`cidx = segIdx / C`, `slot = segIdx % C`) rather than a stored identifier — there
//! is no reverse map from segment to chunk. A split inserts the new right-hand segment
//! immediately after the left half, which shifts the position (and therefore the chunk
//! address) of every later segment; all of them are marked dirty so the next flush
//! rewrites their chunks under the correct address.

use std::collections::BTreeSet;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::chunk::{chunk_key, Chunk, ChunkCache};
use crate::error::{CodecError, Error};
use crate::fenwick::FenwickTree;
use crate::segment::{Segment, SegmentMeta};
use crate::store::BlobStore;

/// Persisted shape of a [`FenwickBase`], enough to rehydrate without loading any segment
/// content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FenwickBaseMeta<T> {
    /// Maximum values per segment before a split.
    pub segment_capacity: usize,
    /// Segment slots per chunk.
    pub chunk_capacity: usize,
    /// Descriptors for every segment, in order.
    pub segments: Vec<SegmentMeta<T>>,
    /// Current committed key for each chunk index, append-only in length.
    pub chunks: Vec<Option<String>>,
}

/// Array of bounded segments, Fenwick-indexed, persisted through chunked, copy-on-write
/// blobs.
pub struct FenwickBase<T, S> {
    namespace: String,
    s: usize,
    c: usize,
    store: S,
    segments: Vec<Segment<T>>,
    fenwick: FenwickTree,
    chunks: Vec<Option<String>>,
    dirty: BTreeSet<usize>,
    chunk_cache: ChunkCache<T>,
    #[cfg(test)]
    rebuild_count: usize,
}

impl<T, S> FenwickBase<T, S>
where
    T: Clone + Serialize + DeserializeOwned,
    S: BlobStore,
{
    /// Creates a fresh, empty base. `namespace` seeds generated chunk keys and should be
    /// unique per sequence instance sharing a store.
    pub fn new(store: S, namespace: impl Into<String>, segment_capacity: usize, chunk_capacity: usize) -> Self {
        let segments = vec![Segment::empty()];
        let fenwick = FenwickTree::build(&[0]);

        Self {
            namespace: namespace.into(),
            s: segment_capacity.max(1),
            c: chunk_capacity.max(1),
            store,
            segments,
            fenwick,
            chunks: Vec::new(),
            dirty: BTreeSet::new(),
            chunk_cache: ChunkCache::default(),
            #[cfg(test)]
            rebuild_count: 1,
        }
    }

    /// Rebuilds a base from a persisted [`FenwickBaseMeta`]. No segment content is loaded;
    /// the chunk cache starts empty.
    pub fn hydrate(store: S, namespace: impl Into<String>, meta: FenwickBaseMeta<T>) -> Self {
        let mut segments: Vec<Segment<T>> = meta.segments.into_iter().map(Segment::from_meta).collect();
        if segments.is_empty() {
            segments.push(Segment::empty());
        }
        let counts: Vec<usize> = segments.iter().map(Segment::count).collect();
        let fenwick = FenwickTree::build(&counts);

        Self {
            namespace: namespace.into(),
            s: meta.segment_capacity.max(1),
            c: meta.chunk_capacity.max(1),
            store,
            segments,
            fenwick,
            chunks: meta.chunks,
            dirty: BTreeSet::new(),
            chunk_cache: ChunkCache::default(),
            #[cfg(test)]
            rebuild_count: 1,
        }
    }

    /// Builds the persisted descriptor of this base's current state.
    #[must_use]
    pub fn meta(&self) -> FenwickBaseMeta<T> {
        FenwickBaseMeta {
            segment_capacity: self.s,
            chunk_capacity: self.c,
            segments: self.segments.iter().map(Segment::to_meta).collect(),
            chunks: self.chunks.clone(),
        }
    }

    /// Total number of values currently in the sequence.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fenwick.total()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub(crate) fn segment_capacity(&self) -> usize {
        self.s
    }

    #[cfg(test)]
    pub(crate) fn rebuild_count(&self) -> usize {
        self.rebuild_count
    }

    #[cfg(test)]
    pub(crate) fn segment_layout_len(&self) -> usize {
        self.segments.len()
    }

    fn rebuild_fenwick(&mut self) {
        let counts: Vec<usize> = self.segments.iter().map(Segment::count).collect();
        self.fenwick = FenwickTree::build(&counts);
        #[cfg(test)]
        {
            self.rebuild_count += 1;
        }
    }

    fn mark_dirty_from(&mut self, from: usize) {
        for idx in from..self.segments.len() {
            self.dirty.insert(idx);
        }
    }

    /// Returns `(segment_index, local_offset)` appropriate for inserting a new value at
    /// global position `i`, clamped to the current length (append past the end).
    fn locate_for_insert(&self, i: usize) -> (usize, usize) {
        let total = self.fenwick.total();
        if total == 0 {
            return (0, 0);
        }
        if i >= total {
            let last = self.segments.len() - 1;
            return (last, self.segments[last].count());
        }
        self.fenwick.locate(i)
    }

    async fn ensure_loaded(&mut self, seg_idx: usize) -> Result<(), Error<S::Error>> {
        if self.segments[seg_idx].is_loaded() {
            return Ok(());
        }
        let cidx = seg_idx / self.c;
        let slot = seg_idx % self.c;
        let key = self.chunks.get(cidx).and_then(|k| k.as_deref());
        let chunk = self.chunk_cache.load(&self.store, cidx, key, self.c).await?;
        let values = chunk.slot(slot).map(<[T]>::to_vec).unwrap_or_default();
        self.segments[seg_idx].values = Some(values);
        Ok(())
    }

    /// Loads every segment in `seg_indices` that isn't already loaded, fetching the
    /// distinct chunks they live in concurrently (no serial waterfall across chunks).
    async fn ensure_loaded_many(&mut self, seg_indices: &[usize]) -> Result<(), Error<S::Error>> {
        let needed: BTreeSet<usize> = seg_indices
            .iter()
            .filter(|&&idx| !self.segments[idx].is_loaded())
            .map(|&idx| idx / self.c)
            .collect();

        let requests: Vec<(usize, Option<String>)> = needed
            .into_iter()
            .map(|cidx| (cidx, self.chunks.get(cidx).cloned().flatten()))
            .collect();

        self.chunk_cache.load_many(&self.store, &requests, self.c).await?;

        for &idx in seg_indices {
            if self.segments[idx].is_loaded() {
                continue;
            }
            let cidx = idx / self.c;
            let slot = idx % self.c;
            let key = self.chunks.get(cidx).and_then(|k| k.as_deref());
            let chunk = self.chunk_cache.load(&self.store, cidx, key, self.c).await?;
            let values = chunk.slot(slot).map(<[T]>::to_vec).unwrap_or_default();
            self.segments[idx].values = Some(values);
        }

        Ok(())
    }

    /// Splits segment `seg_idx` if it now exceeds capacity, rebuilding the Fenwick tree
    /// and marking every segment from `seg_idx` onward dirty when it does.
    fn split_if_needed(&mut self, seg_idx: usize) {
        if let Some(right) = self.segments[seg_idx].split_if_overflowing(self.s) {
            log::trace!(
                "segment {seg_idx} split (count exceeded capacity {})",
                self.s
            );
            self.segments.insert(seg_idx + 1, right);
            self.rebuild_fenwick();
            self.mark_dirty_from(seg_idx);
        }
    }

    /// Reads the value at global position `i`, or `None` if out of range.
    pub async fn get(&mut self, i: usize) -> Result<Option<T>, Error<S::Error>> {
        if i >= self.len() {
            return Ok(None);
        }
        let (seg_idx, local) = self.fenwick.locate(i);
        self.ensure_loaded(seg_idx).await?;
        Ok(self.segments[seg_idx]
            .values
            .as_ref()
            .and_then(|v| v.get(local).cloned()))
    }

    /// Reads the half-open range `[lo, hi)`, clamped to the sequence's current length.
    pub async fn range(&mut self, lo: usize, hi: usize) -> Result<Vec<T>, Error<S::Error>> {
        let total = self.len();
        let lo = lo.min(total);
        let hi = hi.min(total).max(lo);
        if lo == hi {
            return Ok(Vec::new());
        }

        let (start_seg, _) = self.fenwick.locate(lo);
        let (end_seg, _) = self.fenwick.locate(hi - 1);
        let touched: Vec<usize> = (start_seg..=end_seg).collect();
        self.ensure_loaded_many(&touched).await?;

        let mut out = Vec::with_capacity(hi - lo);
        for &seg_idx in &touched {
            let seg_start = self.fenwick.prefix_sum(seg_idx);
            let values = self.segments[seg_idx]
                .values
                .as_ref()
                .expect("segment loaded by ensure_loaded_many");
            let local_lo = lo.saturating_sub(seg_start).min(values.len());
            let local_hi = hi.saturating_sub(seg_start).min(values.len());
            out.extend_from_slice(&values[local_lo..local_hi]);
        }
        Ok(out)
    }

    /// Inserts `value` at global position `i` (clamped to the current length), splitting
    /// the target segment if it now overflows. Uses a Fenwick point-update, never a
    /// rebuild, unless a split occurs.
    pub async fn insert_at(&mut self, i: usize, value: T) -> Result<(), Error<S::Error>> {
        let i = i.min(self.len());
        let (seg_idx, local) = self.locate_for_insert(i);
        self.ensure_loaded(seg_idx).await?;

        let seg = &mut self.segments[seg_idx];
        seg.values.as_mut().expect("loaded above").insert(local, value);
        seg.count += 1;
        self.fenwick.point_add(seg_idx, 1);
        self.dirty.insert(seg_idx);

        self.split_if_needed(seg_idx);
        Ok(())
    }

    /// Inserts many `(original_index, value)` pairs in one batched pass. `original_index`
    /// refers to a position in the sequence *before any of these insertions* — unlike
    /// calling `insert_at` once per pair, later pairs never see the shifts earlier pairs in
    /// the same batch caused. When several pairs share the same (clamped) original index,
    /// they are spliced in together, preserving their relative order in `pairs`.
    ///
    /// Every pair's owning segment is resolved against the pre-insertion layout before any
    /// segment is touched, every touched segment is pre-loaded in one batch (no waterfall),
    /// and the Fenwick tree is rebuilt exactly once at the end, regardless of how many
    /// segments were merged into or split along the way.
    pub async fn insert_many_at(&mut self, pairs: Vec<(usize, T)>) -> Result<(), Error<S::Error>> {
        if pairs.is_empty() {
            return Ok(());
        }

        let total = self.len();
        let mut annotated: Vec<(usize, usize, T)> = pairs
            .into_iter()
            .enumerate()
            .map(|(order, (idx, value))| (idx.min(total), order, value))
            .collect();
        annotated.sort_by_key(|(old_idx, order, _)| (*old_idx, *order));

        let mut by_segment: std::collections::BTreeMap<usize, Vec<(usize, T)>> = std::collections::BTreeMap::new();
        for (old_idx, _, value) in annotated {
            let (seg_idx, local) = self.locate_for_insert(old_idx);
            by_segment.entry(seg_idx).or_default().push((local, value));
        }

        let touched: Vec<usize> = by_segment.keys().copied().collect();
        self.ensure_loaded_many(&touched).await?;

        let mut shift = 0usize;
        let mut min_split_at: Option<usize> = None;

        for (orig_seg_idx, inserts) in by_segment {
            let seg_idx = orig_seg_idx + shift;
            let old_values = self.segments[seg_idx].values.take().expect("loaded above");

            let mut merged = Vec::with_capacity(old_values.len() + inserts.len());
            let mut inserts = inserts.into_iter().peekable();
            for (old_local, old_value) in old_values.into_iter().enumerate() {
                while inserts.peek().is_some_and(|&(local, _)| local <= old_local) {
                    let (_, value) = inserts.next().expect("just peeked");
                    merged.push(value);
                }
                merged.push(old_value);
            }
            for (_, value) in inserts {
                merged.push(value);
            }

            self.segments[seg_idx].count = merged.len();
            self.segments[seg_idx].values = Some(merged);
            self.dirty.insert(seg_idx);

            let mut worklist = vec![seg_idx];
            while let Some(idx) = worklist.pop() {
                if let Some(right) = self.segments[idx].split_if_overflowing(self.s) {
                    log::trace!(
                        "segment {idx} split during batch insert (count exceeded capacity {})",
                        self.s
                    );
                    self.segments.insert(idx + 1, right);
                    self.dirty.insert(idx + 1);
                    min_split_at = Some(min_split_at.map_or(idx, |m| m.min(idx)));
                    shift += 1;
                    worklist.push(idx);
                    worklist.push(idx + 1);
                }
            }
        }

        if let Some(from) = min_split_at {
            self.mark_dirty_from(from);
        }
        self.rebuild_fenwick();
        Ok(())
    }

    /// Splices `value` into an ordered sequence: locates the first segment whose max is
    /// `>= value` (the last segment if none qualify), lower-bound searches within it, and
    /// inserts. Returns the resulting global position.
    pub async fn insert_ordered(&mut self, value: T) -> Result<usize, Error<S::Error>>
    where
        T: Ord,
    {
        let seg_idx = self
            .segments
            .iter()
            .position(|seg| seg.max.as_ref().is_none_or(|max| *max >= value))
            .unwrap_or(self.segments.len() - 1);

        self.ensure_loaded(seg_idx).await?;

        let seg = &mut self.segments[seg_idx];
        let values = seg.values.as_mut().expect("loaded above");
        let local = values.partition_point(|existing| existing < &value);
        values.insert(local, value);
        seg.count += 1;
        seg.recompute_bounds();

        self.fenwick.point_add(seg_idx, 1);
        self.dirty.insert(seg_idx);

        let global = self.fenwick.prefix_sum(seg_idx) + local;
        self.split_if_needed(seg_idx);
        Ok(global)
    }

    /// Value-range scan over an ordered sequence: returns every element in the half-open
    /// range `[lo, hi)`, in sorted order.
    ///
    /// Candidate segments are found by binary-searching segment bounds (not positions):
    /// the first segment whose `max >= lo` starts the range, which extends forward while
    /// a segment's `min < hi` — later segments, being sorted, cannot contain anything
    /// smaller than `hi` once one doesn't. All candidates are loaded in one batch (no
    /// waterfall) before any of them are searched.
    pub async fn scan_values(&mut self, lo: &T, hi: &T) -> Result<Vec<T>, Error<S::Error>>
    where
        T: Ord,
    {
        if self.is_empty() || !(lo < hi) {
            return Ok(Vec::new());
        }

        let Some(start) = self
            .segments
            .iter()
            .position(|seg| seg.max.as_ref().is_some_and(|max| max >= lo))
        else {
            return Ok(Vec::new());
        };

        let mut end = start;
        while end < self.segments.len() && self.segments[end].min.as_ref().is_some_and(|min| min < hi) {
            end += 1;
        }
        if end == start {
            return Ok(Vec::new());
        }

        let touched: Vec<usize> = (start..end).collect();
        self.ensure_loaded_many(&touched).await?;

        let mut out = Vec::new();
        for &seg_idx in &touched {
            let values = self.segments[seg_idx]
                .values
                .as_ref()
                .expect("segment loaded by ensure_loaded_many");
            let local_lo = values.partition_point(|v| v < lo);
            let local_hi = values.partition_point(|v| v < hi);
            out.extend_from_slice(&values[local_lo..local_hi]);
        }
        Ok(out)
    }

    /// Returns the global position of `value`, if present (ordered sequences only: binary
    /// searches each candidate segment by bounds, then the segment's content).
    pub async fn index_of(&mut self, value: &T) -> Result<Option<usize>, Error<S::Error>>
    where
        T: Ord,
    {
        let Some(seg_idx) = self
            .segments
            .iter()
            .position(|seg| seg.max.as_ref().is_none_or(|max| max >= value))
        else {
            return Ok(None);
        };

        self.ensure_loaded(seg_idx).await?;
        let values = self.segments[seg_idx].values.as_ref().expect("loaded above");
        match values.binary_search(value) {
            Ok(local) => Ok(Some(self.fenwick.prefix_sum(seg_idx) + local)),
            Err(_) => Ok(None),
        }
    }

    /// Writes every dirty segment's current content to its chunk, concurrently across the
    /// distinct chunks affected. Chunk metadata (`chunks[]`) is only advanced once every
    /// write has succeeded.
    pub async fn flush(&mut self) -> Result<(), Error<S::Error>> {
        if self.dirty.is_empty() {
            log::trace!("flush: nothing dirty");
            return Ok(());
        }

        let dirty: Vec<usize> = self.dirty.iter().copied().collect();
        self.ensure_loaded_many(&dirty).await?;

        let mut by_chunk: std::collections::BTreeMap<usize, Vec<usize>> = std::collections::BTreeMap::new();
        for &seg_idx in &dirty {
            by_chunk.entry(seg_idx / self.c).or_default().push(seg_idx);
        }
        let chunk_count = by_chunk.len();

        let requests: Vec<(usize, Option<String>)> = by_chunk
            .keys()
            .map(|&cidx| (cidx, self.chunks.get(cidx).cloned().flatten()))
            .collect();
        self.chunk_cache.load_many(&self.store, &requests, self.c).await?;

        let mut built: Vec<(usize, Chunk<T>)> = Vec::with_capacity(by_chunk.len());
        for (cidx, seg_indices) in &by_chunk {
            let mut chunk = self.chunk_cache.get(*cidx).cloned().unwrap_or_else(|| Chunk::empty(self.c));
            for &seg_idx in seg_indices {
                let slot = seg_idx % self.c;
                let values = self.segments[seg_idx].values.clone().unwrap_or_default();
                chunk.set_slot(slot, values);
            }
            built.push((*cidx, chunk));
        }

        let namespace = self.namespace.clone();
        let store = &self.store;
        let writes = built.iter().map(|(cidx, chunk)| {
            let namespace = &namespace;
            async move {
                let bytes = bincode::serialize(chunk).map_err(CodecError::from)?;
                let new_key = chunk_key(namespace, *cidx);
                store.set(&new_key, bytes).await.map_err(Error::Store)?;
                Ok::<(usize, String), Error<S::Error>>((*cidx, new_key))
            }
        });
        let results = futures::future::join_all(writes).await;

        let mut new_keys = Vec::with_capacity(results.len());
        for result in results {
            new_keys.push(result?);
        }

        for ((cidx, chunk), (_, new_key)) in built.into_iter().zip(new_keys) {
            if self.chunks.len() <= cidx {
                self.chunks.resize(cidx + 1, None);
            }
            self.chunks[cidx] = Some(new_key);
            self.chunk_cache.put(cidx, chunk);
        }

        self.dirty.clear();
        log::debug!("flush: committed {chunk_count} chunk(s)");
        Ok(())
    }
}
