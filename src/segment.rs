// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A bounded, in-memory slice of one sequence.
//!
//! A segment's identity is its position in the owning sequence's `Vec<Segment<T>>` — there
//! are no per-segment string IDs, matching the final design described in the spec's
//! "Segment identity" design note. `min`/`max` are only meaningful for segments owned by an
//! [`crate::ordered_sequence::OrderedSequence`]; an indexed sequence simply never populates
//! them.

use serde::{Deserialize, Serialize};

/// A single segment's persisted descriptor: everything needed to know its shape without
/// loading its content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentMeta<T> {
    /// Number of values currently in this segment.
    pub count: usize,
    /// Smallest value in the segment (ordered sequences only).
    pub min: Option<T>,
    /// Largest value in the segment (ordered sequences only).
    pub max: Option<T>,
}

/// A segment: a descriptor plus an optional working array.
///
/// The working array is the in-memory, owned copy of the segment's values. It is absent
/// for cold segments that have never been loaded since the owning sequence was hydrated —
/// their `count` (and `min`/`max`) are still known from the meta snapshot.
#[derive(Debug, Clone)]
pub struct Segment<T> {
    pub(crate) count: usize,
    pub(crate) min: Option<T>,
    pub(crate) max: Option<T>,
    pub(crate) values: Option<Vec<T>>,
}

impl<T> Segment<T> {
    /// Creates an empty, already-loaded segment.
    pub fn empty() -> Self {
        Self {
            count: 0,
            min: None,
            max: None,
            values: Some(Vec::new()),
        }
    }

    /// Creates a cold segment from a persisted descriptor (no working array loaded).
    pub fn from_meta(meta: SegmentMeta<T>) -> Self {
        Self {
            count: meta.count,
            min: meta.min,
            max: meta.max,
            values: None,
        }
    }

    /// Builds the persisted descriptor for this segment.
    pub fn to_meta(&self) -> SegmentMeta<T>
    where
        T: Clone,
    {
        SegmentMeta {
            count: self.count,
            min: self.min.clone(),
            max: self.max.clone(),
        }
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.values.is_some()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Recomputes `min`/`max` from the loaded content. Used after a structural change
    /// (split) to the segment's array. No-op if the segment isn't loaded.
    pub fn recompute_bounds(&mut self)
    where
        T: Clone,
    {
        if let Some(values) = &self.values {
            self.min = values.first().cloned();
            self.max = values.last().cloned();
        }
    }

    /// Splits this segment at `floor(count / 2)` if it currently exceeds `capacity`.
    ///
    /// Returns the new right-hand segment on success. Returns `None` and leaves `self`
    /// untouched if splitting is unnecessary (`count <= capacity`) or would produce an empty
    /// half — silently suppressed rather than raised as an error, since it cannot happen for
    /// any split of a segment with `count >= 2`; the guard exists only to keep this function
    /// total instead of asserting an invariant no caller can actually violate.
    ///
    /// # Panics
    ///
    /// Panics if the segment isn't loaded — callers must `ensure_loaded` first.
    pub fn split_if_overflowing(&mut self, capacity: usize) -> Option<Self>
    where
        T: Clone,
    {
        if self.count <= capacity {
            return None;
        }

        let values = self.values.as_mut().expect("segment must be loaded to split");
        let mid = values.len() / 2;

        if mid == 0 || mid == values.len() {
            // Splitting would produce an empty half; suppress it and tolerate the
            // transient overflow, per spec 4.3 split policy.
            return None;
        }

        let right_values = values.split_off(mid);
        self.count = values.len();

        let mut right = Self {
            count: right_values.len(),
            min: right_values.first().cloned(),
            max: right_values.last().cloned(),
            values: Some(right_values),
        };

        self.recompute_bounds();
        right.recompute_bounds();

        Some(right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_even() {
        let mut seg = Segment {
            count: 8,
            min: Some(0),
            max: Some(7),
            values: Some((0..8).collect()),
        };

        let right = seg.split_if_overflowing(4).unwrap();
        assert_eq!(seg.values.unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(right.values.unwrap(), vec![4, 5, 6, 7]);
        assert_eq!(seg.count, 4);
        assert_eq!(right.count, 4);
    }

    #[test]
    fn no_split_under_capacity() {
        let mut seg = Segment {
            count: 3,
            min: Some(0),
            max: Some(2),
            values: Some(vec![0, 1, 2]),
        };
        assert!(seg.split_if_overflowing(4).is_none());
    }

    #[test]
    fn split_sets_bounds() {
        let mut seg = Segment {
            count: 5,
            min: Some(1),
            max: Some(9),
            values: Some(vec![1, 3, 5, 7, 9]),
        };
        let right = seg.split_if_overflowing(4).unwrap();
        assert_eq!(seg.min, Some(1));
        assert_eq!(seg.max, Some(3));
        assert_eq!(right.min, Some(5));
        assert_eq!(right.max, Some(9));
    }
}
