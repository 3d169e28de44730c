// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Builder-style configuration for [`crate::table::Table`] and the sequences it creates.

use crate::value::ValueType;

/// The default segment capacity (S) for every sequence a table creates.
pub const DEFAULT_SEGMENT_COUNT: usize = 64;
/// The default chunk capacity (C) for every sequence a table creates.
pub const DEFAULT_CHUNK_COUNT: usize = 16;

/// The `{segment_count, chunk_count}` pair threaded into every sequence a table owns,
/// including ones created implicitly on first sighting of a column.
#[derive(Debug, Clone, Copy)]
pub struct SequenceConfig {
    pub segment_count: usize,
    pub chunk_count: usize,
}

/// Builder for a [`crate::table::Table`]'s shape.
#[derive(Debug, Clone)]
pub struct TableConfig {
    order_key: String,
    order_value_type: ValueType,
    segment_count: usize,
    chunk_count: usize,
}

impl TableConfig {
    /// Starts a configuration naming the column used as the table's order key and its
    /// value type. Every other setting takes its default until overridden.
    #[must_use]
    pub fn new(order_key: impl Into<String>, order_value_type: ValueType) -> Self {
        Self {
            order_key: order_key.into(),
            order_value_type,
            segment_count: DEFAULT_SEGMENT_COUNT,
            chunk_count: DEFAULT_CHUNK_COUNT,
        }
    }

    /// Sets the maximum values per segment (S) before a split.
    #[must_use]
    pub fn segment_count(mut self, segment_count: usize) -> Self {
        self.segment_count = segment_count;
        self
    }

    /// Sets the segment slots per chunk (C). `0` is normalized to `1`.
    #[must_use]
    pub fn chunk_count(mut self, chunk_count: usize) -> Self {
        if chunk_count == 0 {
            log::debug!("chunk_count 0 normalized to 1");
            self.chunk_count = 1;
        } else {
            self.chunk_count = chunk_count;
        }
        self
    }

    #[must_use]
    pub fn order_key(&self) -> &str {
        &self.order_key
    }

    #[must_use]
    pub fn order_value_type(&self) -> ValueType {
        self.order_value_type
    }

    #[must_use]
    pub fn sequence_config(&self) -> SequenceConfig {
        SequenceConfig {
            segment_count: self.segment_count,
            chunk_count: self.chunk_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_count_zero_normalizes_to_one() {
        let config = TableConfig::new("ts", ValueType::Number).chunk_count(0);
        assert_eq!(config.sequence_config().chunk_count, 1);
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = TableConfig::new("ts", ValueType::Number);
        let seq = config.sequence_config();
        assert_eq!(seq.segment_count, DEFAULT_SEGMENT_COUNT);
        assert_eq!(seq.chunk_count, DEFAULT_CHUNK_COUNT);
    }

    #[test]
    fn setters_chain_and_override() {
        let config = TableConfig::new("ts", ValueType::String)
            .segment_count(8)
            .chunk_count(4);
        let seq = config.sequence_config();
        assert_eq!(seq.segment_count, 8);
        assert_eq!(seq.chunk_count, 4);
        assert_eq!(config.order_key(), "ts");
    }
}
