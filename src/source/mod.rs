//! Physical source configurations (spec §6 supplement, grounded in
//! `original_source/iotdb/impl/YSB_legacy/YSBGeneratorSource.hpp` and
//! `CSVSource.hpp`). Neither variant parses a query language; both are
//! concrete descriptors an already-compiled plan may carry, used to drive
//! the worker core deterministically in the absence of a real network or
//! filesystem dependency.

use crate::buffer::{BufferPool, TupleBuffer};
use crate::error::{EngineError, Result};
use crate::schema::Schema;
use std::io::BufRead;

/// One field's value, written into a tuple's fixed-width slot according to
/// its schema `PhysicalType`.
#[derive(Debug, Clone)]
pub enum FieldValue {
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    Str(String),
}

#[derive(Debug, Clone)]
pub enum SourceConfig {
    /// A programmatic generator: `tuples_per_buffer` rows per buffer,
    /// `buffers` buffers total, each row built by `pattern`.
    Lambda { buffers: u64, tuples_per_buffer: u64, schema: Schema, pattern: RowPattern },
    /// Replays a comma-separated file, packing `tuples_per_buffer` rows per
    /// buffer in file order.
    Csv { path: String, schema: Schema, tuples_per_buffer: u64 },
}

/// Deterministic row-generation pattern for [`SourceConfig::Lambda`].
#[derive(Debug, Clone)]
pub enum RowPattern {
    /// Emits `(key, value, timestamp)` rows where `timestamp` increments by
    /// `tick_millis` for every row produced by this source, `key` is fixed,
    /// and `value` is fixed — the shape every end-to-end scenario in spec
    /// §8 needs (a constant-rate keyed counter/sum stream).
    ConstantKeyedValue { key: u64, value: f64, tick_millis: u64 },
}

fn write_field(buffer: &TupleBuffer, offset: usize, value: &FieldValue) -> Result<()> {
    buffer.with_payload_mut(|payload| match value {
        FieldValue::I64(v) => payload[offset..offset + 8].copy_from_slice(&v.to_le_bytes()),
        FieldValue::U64(v) => payload[offset..offset + 8].copy_from_slice(&v.to_le_bytes()),
        FieldValue::F64(v) => payload[offset..offset + 8].copy_from_slice(&v.to_le_bytes()),
        FieldValue::Bool(v) => payload[offset] = *v as u8,
        FieldValue::Str(_) => {}
    });
    Ok(())
}

/// Writes one row's worth of `(key, value, timestamp)` columns using
/// `schema`'s field order (expects exactly three fields: an integer key, a
/// numeric value, and an integer timestamp — the layout every scenario in
/// spec §8 uses).
fn write_row(buffer: &TupleBuffer, schema: &Schema, row_index: usize, key: u64, value: f64, timestamp: u64) -> Result<()> {
    if schema.fields.len() < 3 {
        return Err(EngineError::InvalidSchema("lambda/csv source schema needs at least 3 fields (key, value, timestamp)".to_string()));
    }
    let tuple_base = row_index * schema.size_in_bytes();
    let key_offset = tuple_base + schema.offset_of(0);
    let value_offset = tuple_base + schema.offset_of(1);
    let ts_offset = tuple_base + schema.offset_of(2);
    write_field(buffer, key_offset, &FieldValue::U64(key))?;
    write_field(buffer, value_offset, &FieldValue::F64(value))?;
    write_field(buffer, ts_offset, &FieldValue::U64(timestamp))?;
    Ok(())
}

/// Runs a [`SourceConfig::Lambda`] to completion, calling `emit` once per
/// filled buffer. Synchronous and bounded, so callers (tests, the worker's
/// source thread) fully control pacing.
pub fn run_lambda(pool: &BufferPool, buffers: u64, tuples_per_buffer: u64, schema: &Schema, pattern: &RowPattern, origin_id: u64, mut emit: impl FnMut(TupleBuffer)) -> Result<()> {
    let RowPattern::ConstantKeyedValue { key, value, tick_millis } = pattern;
    let mut sequence_number = 0u64;
    let mut timestamp = 0u64;
    for _ in 0..buffers {
        let buf = pool.acquire(None)?;
        for row in 0..tuples_per_buffer as usize {
            write_row(&buf, schema, row, *key, *value, timestamp)?;
            timestamp += tick_millis;
        }
        buf.set_number_of_tuples(tuples_per_buffer as u32);
        buf.set_tuple_size_in_bytes(schema.size_in_bytes() as u32);
        buf.set_origin_id(origin_id);
        buf.set_sequence_number(sequence_number);
        buf.set_watermark(timestamp.saturating_sub(*tick_millis));
        sequence_number += 1;
        emit(buf);
    }
    Ok(())
}

/// Runs a [`SourceConfig::Csv`] to completion. Expects `key,value,timestamp`
/// per line (matching [`write_row`]'s column order); blank lines are
/// skipped.
pub fn run_csv(pool: &BufferPool, path: &str, schema: &Schema, tuples_per_buffer: u64, origin_id: u64, mut emit: impl FnMut(TupleBuffer)) -> Result<()> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut sequence_number = 0u64;
    let mut pending_rows: Vec<(u64, f64, u64)> = Vec::new();

    let mut flush = |rows: &mut Vec<(u64, f64, u64)>, emit: &mut dyn FnMut(TupleBuffer), sequence_number: &mut u64| -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let buf = pool.acquire(None)?;
        let mut max_ts = 0u64;
        for (row_index, (key, value, timestamp)) in rows.iter().enumerate() {
            write_row(&buf, schema, row_index, *key, *value, *timestamp)?;
            max_ts = max_ts.max(*timestamp);
        }
        buf.set_number_of_tuples(rows.len() as u32);
        buf.set_tuple_size_in_bytes(schema.size_in_bytes() as u32);
        buf.set_origin_id(origin_id);
        buf.set_sequence_number(*sequence_number);
        buf.set_watermark(max_ts);
        *sequence_number += 1;
        rows.clear();
        emit(buf);
        Ok(())
    };

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut parts = line.split(',');
        let key: u64 = parts
            .next()
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| EngineError::Serialization(format!("bad csv key in line: {line}")))?;
        let value: f64 = parts
            .next()
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| EngineError::Serialization(format!("bad csv value in line: {line}")))?;
        let timestamp: u64 = parts
            .next()
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| EngineError::Serialization(format!("bad csv timestamp in line: {line}")))?;
        pending_rows.push((key, value, timestamp));
        if pending_rows.len() as u64 >= tuples_per_buffer {
            flush(&mut pending_rows, &mut emit, &mut sequence_number)?;
        }
    }
    flush(&mut pending_rows, &mut emit, &mut sequence_number)?;
    Ok(())
}

impl SourceConfig {
    pub fn schema(&self) -> &Schema {
        match self {
            SourceConfig::Lambda { schema, .. } => schema,
            SourceConfig::Csv { schema, .. } => schema,
        }
    }

    /// Drives this source to completion against `pool`, calling `emit` once
    /// per filled buffer.
    pub fn run(&self, pool: &BufferPool, origin_id: u64, emit: impl FnMut(TupleBuffer)) -> Result<()> {
        match self {
            SourceConfig::Lambda { buffers, tuples_per_buffer, schema, pattern } => {
                run_lambda(pool, *buffers, *tuples_per_buffer, schema, pattern, origin_id, emit)
            }
            SourceConfig::Csv { path, schema, tuples_per_buffer } => run_csv(pool, path, schema, *tuples_per_buffer, origin_id, emit),
        }
    }
}
