// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! An embedded, append-ordered, columnar storage engine for time-series-shaped data.
//!
//! ##### About
//!
//! Rows arrive out of order but are retrievable in sorted order of a designated key
//! column, with random index-based access, value-range scans, and persistence to any
//! pluggable blob key-value store ([`BlobStore`]).
//!
//! The engine is built from three layers:
//!
//! - [`IndexedSequence`]: a positional sequence — insert at an index, read by index or
//!   positional range. Backed by bounded, Fenwick-indexed segments persisted in
//!   copy-on-write chunks.
//! - [`OrderedSequence`]: the same segmented substrate, but values are spliced in sorted
//!   order rather than at a caller-given position, with per-segment `(min, max)` bounds
//!   enabling value-range [`OrderedSequence::scan`].
//! - [`Table`]: one [`OrderedSequence`] order column plus any number of dynamically
//!   created, typed [`IndexedSequence`] columns kept aligned to it by position, with an
//!   atomic meta-snapshot commit across every column.
//!
//! Deletion, update-in-place, secondary indexes, distribution, replication and compaction
//! are explicitly out of scope — this crate is the storage core, not a database server.
//!
//! # Example usage
//!
//! ```
//! use fenwick_tsdb::{MemoryStore, Table, TableConfig, Value, ValueType};
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! tokio::runtime::Runtime::new()?.block_on(async {
//!     let store = Arc::new(MemoryStore::new());
//!     let mut table = Table::new(store, "events", TableConfig::new("ts", ValueType::Number));
//!
//!     let mut row = BTreeMap::new();
//!     row.insert("ts".to_owned(), Value::Number(2.0));
//!     row.insert("name".to_owned(), Value::String("second".to_owned()));
//!     table.insert(vec![row]).await.unwrap();
//!
//!     let mut row = BTreeMap::new();
//!     row.insert("ts".to_owned(), Value::Number(1.0));
//!     table.insert(vec![row]).await.unwrap();
//!
//!     // Rows come back sorted by the order key, regardless of insertion order, with
//!     // columns the row never mentioned simply absent.
//!     let rows = table.range(0, None).await.unwrap();
//!     assert_eq!(rows[0].get("ts"), Some(&Value::Number(1.0)));
//!     assert_eq!(rows[0].get("name"), None);
//!     assert_eq!(rows[1].get("name"), Some(&Value::String("second".to_owned())));
//!
//!     // Flushing persists every column, then atomically commits one meta snapshot.
//!     table.flush("events.meta").await.unwrap();
//! });
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn, clippy::module_name_repetitions)]

pub mod config;
pub mod error;
mod fenwick;
pub mod fenwick_base;
pub mod indexed_sequence;
pub mod ordered_sequence;
pub mod segment;
pub mod store;
pub mod table;
mod time;
pub mod value;

mod chunk;

pub use config::{SequenceConfig, TableConfig};
pub use error::{Error, Result};
pub use fenwick_base::FenwickBaseMeta;
pub use indexed_sequence::IndexedSequence;
pub use ordered_sequence::OrderedSequence;
pub use segment::SegmentMeta;
pub use store::{BlobStore, MemoryStore};
pub use table::{Row, Table, TableMeta};
pub use value::{Value, ValueType};
