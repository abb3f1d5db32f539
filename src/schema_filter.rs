//! Per-schema column filters with exact value sets
//!
//! Unlike the probabilistic filters, these hold the *exhaustive* set of
//! values present in a schema's selective columns, so a miss is definitive.
//! Only columns whose distinct-to-total ratio stays at or below the
//! selectivity threshold are persisted; a query on any other column admits
//! conservatively.
//!
//! Serialized layout (identical for both filters apart from the value
//! encoding): `count(u32)` then per column `column_id(i32) |
//! num_values(u64) | values`, where integer values are `i64` and string
//! values are `len(u64) | bytes`.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{Result, SieveError};
use crate::wire::{put_i32, put_i64, put_u32, put_u64, ByteReader};

/// Persist a column only when its distinct values are at most this share of
/// its total values; anything denser prunes too rarely to pay for itself.
pub const SELECTIVITY_THRESHOLD: f64 = 0.1;

/// Exact-set filter over a schema's integer columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaIntColumnFilter {
    column_values: FxHashMap<i32, FxHashSet<i64>>,
    column_counts: FxHashMap<i32, u64>,
}

impl SchemaIntColumnFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one value occurrence during ingestion.
    pub fn add_value(&mut self, column_id: i32, value: i64) {
        self.column_values.entry(column_id).or_default().insert(value);
        *self.column_counts.entry(column_id).or_insert(0) += 1;
    }

    /// True when no column is tracked.
    pub fn is_empty(&self) -> bool {
        self.column_values.is_empty()
    }

    /// Tests whether `value` can appear in `column_id`.
    ///
    /// An untracked column admits: the column was not selective enough to
    /// persist, and a definitive answer is impossible without it.
    pub fn contains(&self, column_id: i32, value: i64) -> bool {
        match self.column_values.get(&column_id) {
            Some(values) => values.contains(&value),
            None => true,
        }
    }

    fn selected_columns(&self) -> Vec<i32> {
        let mut selected: Vec<i32> = self
            .column_values
            .iter()
            .filter(|(column_id, values)| {
                let total = self.column_counts.get(column_id).copied().unwrap_or(0);
                total > 0 && values.len() as f64 / total as f64 <= SELECTIVITY_THRESHOLD
            })
            .map(|(&column_id, _)| column_id)
            .collect();
        selected.sort_unstable();
        selected
    }

    /// Serializes the selective columns only.
    pub fn write(&self, out: &mut Vec<u8>) {
        let selected = self.selected_columns();
        put_u32(out, selected.len() as u32);
        for column_id in selected {
            let values = &self.column_values[&column_id];
            put_i32(out, column_id);
            put_u64(out, values.len() as u64);
            let mut sorted: Vec<i64> = values.iter().copied().collect();
            sorted.sort_unstable();
            for value in sorted {
                put_i64(out, value);
            }
        }
    }

    /// Reads a filter written by [`write`](Self::write).
    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let num_columns = reader.read_u32()?;
        let mut filter = Self::new();
        for _ in 0..num_columns {
            let column_id = reader.read_i32()?;
            let num_values = reader.read_u64()?;
            let values = filter.column_values.entry(column_id).or_default();
            for _ in 0..num_values {
                values.insert(reader.read_i64()?);
            }
            // Counts only matter at build time.
            filter.column_counts.insert(column_id, 0);
        }
        Ok(filter)
    }
}

/// Exact-set filter over a schema's string columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaStringColumnFilter {
    column_values: FxHashMap<i32, FxHashSet<String>>,
    column_counts: FxHashMap<i32, u64>,
}

impl SchemaStringColumnFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one value occurrence during ingestion.
    pub fn add_value(&mut self, column_id: i32, value: &str) {
        self.column_values
            .entry(column_id)
            .or_default()
            .insert(value.to_string());
        *self.column_counts.entry(column_id).or_insert(0) += 1;
    }

    /// True when no column is tracked.
    pub fn is_empty(&self) -> bool {
        self.column_values.is_empty()
    }

    /// Tests whether `value` can appear in `column_id`; untracked columns
    /// admit.
    pub fn contains(&self, column_id: i32, value: &str) -> bool {
        match self.column_values.get(&column_id) {
            Some(values) => values.contains(value),
            None => true,
        }
    }

    fn selected_columns(&self) -> Vec<i32> {
        let mut selected: Vec<i32> = self
            .column_values
            .iter()
            .filter(|(column_id, values)| {
                let total = self.column_counts.get(column_id).copied().unwrap_or(0);
                total > 0 && values.len() as f64 / total as f64 <= SELECTIVITY_THRESHOLD
            })
            .map(|(&column_id, _)| column_id)
            .collect();
        selected.sort_unstable();
        selected
    }

    /// Serializes the selective columns only.
    pub fn write(&self, out: &mut Vec<u8>) {
        let selected = self.selected_columns();
        put_u32(out, selected.len() as u32);
        for column_id in selected {
            let values = &self.column_values[&column_id];
            put_i32(out, column_id);
            put_u64(out, values.len() as u64);
            let mut sorted: Vec<&String> = values.iter().collect();
            sorted.sort_unstable();
            for value in sorted {
                put_u64(out, value.len() as u64);
                out.extend_from_slice(value.as_bytes());
            }
        }
    }

    /// Reads a filter written by [`write`](Self::write).
    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let num_columns = reader.read_u32()?;
        let mut filter = Self::new();
        for _ in 0..num_columns {
            let column_id = reader.read_i32()?;
            let num_values = reader.read_u64()?;
            let values = filter.column_values.entry(column_id).or_default();
            for _ in 0..num_values {
                let len = reader.read_u64()? as usize;
                let bytes = reader.read_bytes(len)?;
                let value = std::str::from_utf8(bytes)
                    .map_err(|_| {
                        SieveError::CorruptHeader(
                            "schema filter value is not valid UTF-8".to_string(),
                        )
                    })?
                    .to_string();
                values.insert(value);
            }
            filter.column_counts.insert(column_id, 0);
        }
        Ok(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selective_int_filter() -> SchemaIntColumnFilter {
        let mut filter = SchemaIntColumnFilter::new();
        // Column 1: 3 distinct values over 100 occurrences (selective).
        for i in 0..100 {
            filter.add_value(1, i % 3);
        }
        // Column 2: every value distinct (not selective).
        for i in 0..100 {
            filter.add_value(2, i);
        }
        filter
    }

    #[test]
    fn test_int_contains_exact_semantics() {
        let filter = selective_int_filter();
        assert!(filter.contains(1, 0));
        assert!(filter.contains(1, 2));
        assert!(!filter.contains(1, 7));
        // Untracked column admits conservatively.
        assert!(filter.contains(99, 7));
    }

    #[test]
    fn test_int_selectivity_threshold() {
        let filter = selective_int_filter();
        let mut buf = Vec::new();
        filter.write(&mut buf);
        let restored = SchemaIntColumnFilter::read(&mut ByteReader::new(&buf)).unwrap();

        // Only the selective column survived serialization.
        assert!(restored.contains(1, 0));
        assert!(!restored.contains(1, 7));
        // Column 2 was dropped at write time, so it now admits everything.
        assert!(restored.contains(2, 12345));
    }

    #[test]
    fn test_int_round_trip() {
        let mut filter = SchemaIntColumnFilter::new();
        for _ in 0..50 {
            filter.add_value(7, -42);
            filter.add_value(7, i64::MAX);
        }
        let mut buf = Vec::new();
        filter.write(&mut buf);
        let restored = SchemaIntColumnFilter::read(&mut ByteReader::new(&buf)).unwrap();
        assert!(restored.contains(7, -42));
        assert!(restored.contains(7, i64::MAX));
        assert!(!restored.contains(7, 0));
    }

    #[test]
    fn test_string_filter_round_trip() {
        let mut filter = SchemaStringColumnFilter::new();
        for _ in 0..50 {
            filter.add_value(3, "GET");
            filter.add_value(3, "POST");
        }
        assert!(filter.contains(3, "GET"));
        assert!(!filter.contains(3, "DELETE"));
        assert!(filter.contains(8, "anything"));

        let mut buf = Vec::new();
        filter.write(&mut buf);
        let restored = SchemaStringColumnFilter::read(&mut ByteReader::new(&buf)).unwrap();
        assert!(restored.contains(3, "GET"));
        assert!(restored.contains(3, "POST"));
        assert!(!restored.contains(3, "DELETE"));
    }

    #[test]
    fn test_empty_filters() {
        let filter = SchemaIntColumnFilter::new();
        assert!(filter.is_empty());
        let mut buf = Vec::new();
        filter.write(&mut buf);
        let restored = SchemaIntColumnFilter::read(&mut ByteReader::new(&buf)).unwrap();
        assert!(restored.is_empty());
    }

    #[test]
    fn test_serialization_deterministic() {
        let filter = selective_int_filter();
        let mut first = Vec::new();
        filter.write(&mut first);
        let mut second = Vec::new();
        filter.write(&mut second);
        assert_eq!(first, second);
    }
}
