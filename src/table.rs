// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A table: one [`OrderedSequence`] order column plus dynamically created, typed
//! [`IndexedSequence`] columns kept aligned to it by position, with atomic meta commit.
//!
//! Every non-order value is stored as `Option<Value>` rather than a third "missing" enum
//! variant — see [`crate::value`]'s module docs and the spec's dynamic-typing design note.
//! A column's bucket (`string` or `number`) is decided the first time a concrete value for
//! that name is seen and never changes afterward; a later row supplying the other type for
//! the same column name is [`crate::error::Error::UnsupportedColumnType`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{SequenceConfig, TableConfig};
use crate::error::{CodecError, Error};
use crate::fenwick_base::FenwickBaseMeta;
use crate::indexed_sequence::IndexedSequence;
use crate::ordered_sequence::OrderedSequence;
use crate::segment::SegmentMeta;
use crate::store::BlobStore;
use crate::value::{Value, ValueType};

/// A single input or output row: column name to concrete value. A column absent from the
/// map is the "missing" case at the table boundary (spec 4.4: "value is missing (absent or
/// empty)" — this crate treats "empty" as out of scope; an explicit empty string is a
/// legitimate [`Value::String`], not a missing sentinel).
pub type Row = BTreeMap<String, Value>;

/// Persisted shape of a [`Table`], sufficient to rehydrate every column against the same
/// store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMeta {
    /// Default segment capacity applied to columns created after this snapshot.
    pub segment_count: usize,
    /// Default chunk capacity applied to columns created after this snapshot.
    pub chunk_count: usize,
    /// The designated order column's name.
    pub order_key: String,
    /// The designated order column's declared value type.
    pub order_value_type: ValueType,
    /// The order column's own sequence snapshot.
    pub order: FenwickBaseMeta<Value>,
    /// String-typed columns, by name.
    pub columns_string: BTreeMap<String, FenwickBaseMeta<Option<Value>>>,
    /// Number-typed columns, by name.
    pub columns_number: BTreeMap<String, FenwickBaseMeta<Option<Value>>>,
}

/// Composes one ordered key column with a dynamically grown set of typed, position-aligned
/// columns.
pub struct Table<S> {
    store: S,
    namespace: String,
    order_key: String,
    order_value_type: ValueType,
    seq_config: SequenceConfig,
    order: OrderedSequence<Value, S>,
    columns_string: BTreeMap<String, IndexedSequence<Option<Value>, S>>,
    columns_number: BTreeMap<String, IndexedSequence<Option<Value>, S>>,
    /// The last snapshot durably written to the store. `None` until the first successful
    /// [`Table::flush`].
    committed: Option<TableMeta>,
}

impl<S> Table<S>
where
    S: BlobStore + Clone,
{
    /// Creates a fresh, empty table under `namespace` (which seeds every column's own
    /// chunk-key namespace).
    pub fn new(store: S, namespace: impl Into<String>, config: TableConfig) -> Self {
        let namespace = namespace.into();
        let seq_config = config.sequence_config();
        let order = OrderedSequence::new(
            store.clone(),
            format!("{namespace}/order"),
            seq_config.segment_count,
            seq_config.chunk_count,
        );

        Self {
            store,
            namespace,
            order_key: config.order_key().to_owned(),
            order_value_type: config.order_value_type(),
            seq_config,
            order,
            columns_string: BTreeMap::new(),
            columns_number: BTreeMap::new(),
            committed: None,
        }
    }

    /// Rebuilds a table from a persisted snapshot. No segment content is loaded for any
    /// column.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OrderTypeMismatch`] if `config`'s declared order value type does
    /// not match the type recorded in `meta`.
    pub fn hydrate(store: S, namespace: impl Into<String>, config: &TableConfig, meta: TableMeta) -> Result<Self, Error<S::Error>> {
        if config.order_value_type() != meta.order_value_type {
            return Err(Error::OrderTypeMismatch {
                expected: config.order_value_type(),
                found: meta.order_value_type,
            });
        }

        let namespace = namespace.into();
        let order = OrderedSequence::hydrate(store.clone(), format!("{namespace}/order"), meta.order);

        let columns_string: BTreeMap<String, IndexedSequence<Option<Value>, S>> = meta
            .columns_string
            .into_iter()
            .map(|(name, seq_meta)| {
                let ns = column_namespace(&namespace, "string", &name);
                (name, IndexedSequence::hydrate(store.clone(), ns, seq_meta))
            })
            .collect();
        let columns_number: BTreeMap<String, IndexedSequence<Option<Value>, S>> = meta
            .columns_number
            .into_iter()
            .map(|(name, seq_meta)| {
                let ns = column_namespace(&namespace, "number", &name);
                (name, IndexedSequence::hydrate(store.clone(), ns, seq_meta))
            })
            .collect();

        let committed = Some(TableMeta {
            segment_count: meta.segment_count,
            chunk_count: meta.chunk_count,
            order_key: meta.order_key.clone(),
            order_value_type: meta.order_value_type,
            order: order.meta(),
            columns_string: columns_string
                .iter()
                .map(|(name, seq): (&String, &IndexedSequence<Option<Value>, S>)| (name.clone(), seq.meta()))
                .collect(),
            columns_number: columns_number
                .iter()
                .map(|(name, seq): (&String, &IndexedSequence<Option<Value>, S>)| (name.clone(), seq.meta()))
                .collect(),
        });

        log::trace!(
            "table rehydrated: total_count={}, {} string column(s), {} number column(s)",
            order.len(),
            columns_string.len(),
            columns_number.len(),
        );

        Ok(Self {
            store,
            namespace,
            order_key: meta.order_key,
            order_value_type: meta.order_value_type,
            seq_config: SequenceConfig {
                segment_count: meta.segment_count,
                chunk_count: meta.chunk_count,
            },
            order,
            columns_string,
            columns_number,
            committed,
        })
    }

    /// Fetches the last committed snapshot from `meta_key`, hydrating a table from it; if
    /// the store has no value at `meta_key` yet, returns a fresh empty table instead.
    pub async fn load(store: S, namespace: impl Into<String>, config: TableConfig, meta_key: &str) -> Result<Self, Error<S::Error>> {
        match store.get(meta_key).await.map_err(Error::Store)? {
            Some(bytes) => {
                let meta: TableMeta = bincode::deserialize(&bytes).map_err(CodecError::from)?;
                Self::hydrate(store, namespace, &config, meta)
            }
            None => Ok(Self::new(store, namespace, config)),
        }
    }

    /// The last committed snapshot, or a freshly built empty one if this table has never
    /// been flushed.
    #[must_use]
    pub fn meta(&self) -> TableMeta {
        self.committed.clone().unwrap_or_else(|| self.fresh_meta())
    }

    fn fresh_meta(&self) -> TableMeta {
        TableMeta {
            segment_count: self.seq_config.segment_count,
            chunk_count: self.seq_config.chunk_count,
            order_key: self.order_key.clone(),
            order_value_type: self.order_value_type,
            order: FenwickBaseMeta {
                segment_capacity: self.seq_config.segment_count,
                chunk_capacity: self.seq_config.chunk_count,
                segments: vec![SegmentMeta {
                    count: 0,
                    min: None,
                    max: None,
                }],
                chunks: Vec::new(),
            },
            columns_string: BTreeMap::new(),
            columns_number: BTreeMap::new(),
        }
    }

    fn live_meta(&self) -> TableMeta {
        TableMeta {
            segment_count: self.seq_config.segment_count,
            chunk_count: self.seq_config.chunk_count,
            order_key: self.order_key.clone(),
            order_value_type: self.order_value_type,
            order: self.order.meta(),
            columns_string: self.columns_string.iter().map(|(n, s)| (n.clone(), s.meta())).collect(),
            columns_number: self.columns_number.iter().map(|(n, s)| (n.clone(), s.meta())).collect(),
        }
    }

    /// Total number of rows (the order column's length).
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Inserts every row in `rows`, in order.
    ///
    /// If a row fails (missing order key, wrong column type, or a store error), rows
    /// inserted earlier in this same call remain inserted — only the failing row and
    /// everything after it in `rows` are not applied.
    pub async fn insert(&mut self, rows: Vec<Row>) -> Result<(), Error<S::Error>> {
        for row in rows {
            self.insert_row(&row).await?;
        }
        Ok(())
    }

    async fn insert_row(&mut self, row: &Row) -> Result<(), Error<S::Error>> {
        let order_value = row.get(&self.order_key).cloned().ok_or(Error::MissingOrderKey)?;
        if order_value.value_type() != self.order_value_type {
            return Err(Error::OrderTypeMismatch {
                expected: self.order_value_type,
                found: order_value.value_type(),
            });
        }

        let prev_total = self.order.len();
        let position = self.order.insert(order_value).await?;

        for (name, seq) in &mut self.columns_string {
            let value = match row.get(name) {
                Some(Value::String(s)) => Some(Value::String(s.clone())),
                Some(_) => return Err(Error::UnsupportedColumnType),
                None => None,
            };
            seq.insert_at(position, value).await?;
        }
        for (name, seq) in &mut self.columns_number {
            let value = match row.get(name) {
                Some(v @ Value::Number(_)) => Some(v.clone()),
                Some(_) => return Err(Error::UnsupportedColumnType),
                None => None,
            };
            seq.insert_at(position, value).await?;
        }

        for (name, value) in row {
            if name == &self.order_key {
                continue;
            }
            if self.columns_string.contains_key(name) || self.columns_number.contains_key(name) {
                continue;
            }

            let mut seq = match value {
                Value::String(_) => IndexedSequence::new(
                    self.store.clone(),
                    column_namespace(&self.namespace, "string", name),
                    self.seq_config.segment_count,
                    self.seq_config.chunk_count,
                ),
                Value::Number(_) => IndexedSequence::new(
                    self.store.clone(),
                    column_namespace(&self.namespace, "number", name),
                    self.seq_config.segment_count,
                    self.seq_config.chunk_count,
                ),
            };
            for _ in 0..prev_total {
                let end = seq.len();
                seq.insert_at(end, None).await?;
            }
            seq.insert_at(position, Some(value.clone())).await?;

            match value {
                Value::String(_) => {
                    self.columns_string.insert(name.clone(), seq);
                }
                Value::Number(_) => {
                    self.columns_number.insert(name.clone(), seq);
                }
            }
        }

        Ok(())
    }

    /// Fetches every non-order column's value at position `i`, omitting missing ones.
    /// Returns `None` if `i` is out of range.
    pub async fn get(&mut self, i: usize) -> Result<Option<Row>, Error<S::Error>> {
        if i >= self.order.len() {
            return Ok(None);
        }

        let mut row = Row::new();
        for (name, seq) in &mut self.columns_string {
            if let Some(Some(value)) = seq.get(i).await? {
                row.insert(name.clone(), value);
            }
        }
        for (name, seq) in &mut self.columns_number {
            if let Some(Some(value)) = seq.get(i).await? {
                row.insert(name.clone(), value);
            }
        }
        Ok(Some(row))
    }

    /// Fetches a positional slice `[offset, offset + limit)` (or to the end, if `limit` is
    /// `None`), assembling full rows including the order key.
    pub async fn range(&mut self, offset: usize, limit: Option<usize>) -> Result<Vec<Row>, Error<S::Error>> {
        let total = self.order.len();
        let lo = offset.min(total);
        let hi = limit.map_or(total, |l| lo.saturating_add(l).min(total));
        if lo >= hi {
            return Ok(Vec::new());
        }

        let order_values = self.order.range(lo, hi).await?;
        let mut rows: Vec<Row> = order_values
            .into_iter()
            .map(|v| {
                let mut row = Row::new();
                row.insert(self.order_key.clone(), v);
                row
            })
            .collect();

        for (name, seq) in &mut self.columns_string {
            let values = seq.range(lo, hi).await?;
            for (row, value) in rows.iter_mut().zip(values) {
                if let Some(v) = value {
                    row.insert(name.clone(), v);
                }
            }
        }
        for (name, seq) in &mut self.columns_number {
            let values = seq.range(lo, hi).await?;
            for (row, value) in rows.iter_mut().zip(values) {
                if let Some(v) = value {
                    row.insert(name.clone(), v);
                }
            }
        }

        Ok(rows)
    }

    /// Flushes every column concurrently, then atomically commits a new meta snapshot
    /// under `meta_key`.
    ///
    /// If any column's flush fails, the committed snapshot (in memory and at `meta_key`
    /// in the store) is left exactly as it was before this call.
    pub async fn flush(&mut self, meta_key: &str) -> Result<(), Error<S::Error>> {
        let order_key = self.order_key.clone();
        let order_fut = async {
            self.order.flush().await.inspect_err(|_| {
                log::warn!("table flush: column {order_key} failed, meta not advanced");
            })
        };

        let (order_res, string_res, number_res) = futures::join!(
            order_fut,
            flush_columns(&mut self.columns_string),
            flush_columns(&mut self.columns_number),
        );
        order_res?;
        string_res?;
        number_res?;

        let snapshot = self.live_meta();
        let bytes = bincode::serialize(&snapshot).map_err(CodecError::from)?;
        self.store.set(meta_key, bytes).await.map_err(Error::Store)?;
        self.committed = Some(snapshot);
        log::debug!("table flush: committed meta under {meta_key}");
        Ok(())
    }
}

fn column_namespace(table_namespace: &str, bucket: &str, name: &str) -> String {
    format!("{table_namespace}/col/{bucket}/{name}")
}

async fn flush_columns<S>(columns: &mut BTreeMap<String, IndexedSequence<Option<Value>, S>>) -> Result<(), Error<S::Error>>
where
    S: BlobStore,
{
    let flushes = columns.iter_mut().map(|(name, seq)| async move {
        seq.flush().await.map_err(|e| (name.clone(), e))
    });
    for result in futures::future::join_all(flushes).await {
        if let Err((name, err)) = result {
            log::warn!("table flush: column {name} failed, meta not advanced");
            return Err(err);
        }
    }
    Ok(())
}
