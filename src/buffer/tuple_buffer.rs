// Copyright (c) NebulaStream Contributors
// SPDX-License-Identifier: Apache-2.0

//! `TupleBuffer`: a reference-counted, zero-copy view over a pooled segment
//! (spec.md §3 "TupleBuffer").
//!
//! The segment itself is a `Vec<u8>` wrapped in `PooledSegment`, whose
//! `Drop` impl returns the backing allocation to whichever free list handed
//! it out. `bytes::Bytes::from_owner` turns that into an atomically
//! refcounted, cheaply sliceable view: `TupleBuffer::slice` creates a child
//! buffer that shares the same underlying allocation and keeps it alive
//! until every clone (parent and children) is dropped, exactly matching the
//! spec's "the backing segment lives as long as any buffer or child-buffer
//! references it."

use std::ops::Range;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;

pub type OriginId = u64;
pub type SequenceNumber = u64;
/// Event-time instant, milliseconds since epoch.
pub type Timestamp = i64;

/// A segment drawn from a buffer-pool tier. Its `Drop` impl is the sole
/// place a segment re-enters (or permanently leaves, for unpooled segments)
/// a free list.
pub struct PooledSegment {
    data: Option<Vec<u8>>,
    on_drop: Option<Box<dyn Fn(Vec<u8>) + Send + Sync>>,
}

impl AsRef<[u8]> for PooledSegment {
    fn as_ref(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }
}

impl Drop for PooledSegment {
    fn drop(&mut self) {
        if let (Some(data), Some(on_drop)) = (self.data.take(), self.on_drop.take()) {
            on_drop(data);
        }
    }
}

/// Mutable builder handed out by `BufferPool::acquire`. Exclusively owned
/// (no sharing) until `finish` freezes it into an immutable, shareable
/// `TupleBuffer` — the producer/consumer boundary the spec describes as "set
/// by the producer before hand-off; downstream operators treat them as
/// immutable."
pub struct TupleBufferBuilder {
    data: Vec<u8>,
    on_drop: Option<Box<dyn Fn(Vec<u8>) + Send + Sync>>,
    cursor: usize,
    tuple_count: usize,
}

impl TupleBufferBuilder {
    pub(crate) fn new(data: Vec<u8>, on_drop: impl Fn(Vec<u8>) + Send + Sync + 'static) -> Self {
        Self {
            data,
            on_drop: Some(Box::new(on_drop)),
            cursor: 0,
            tuple_count: 0,
        }
    }

    pub(crate) fn new_unpooled(data: Vec<u8>) -> Self {
        Self {
            data,
            on_drop: None,
            cursor: 0,
            tuple_count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.cursor)
    }

    /// Raw mutable access for a compiled pipeline stage writing tuples
    /// directly into the segment (the row-major/column-major physical
    /// layout is interpreted by the caller per the bound `Schema`).
    pub fn raw_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Appends one fixed-size row, advancing the tuple count. Panics if the
    /// row would overflow the segment; callers are expected to size rows
    /// against `Schema::row_size_bytes()` before calling this.
    pub fn write_row(&mut self, row: &[u8]) {
        assert!(
            self.cursor + row.len() <= self.data.len(),
            "row write overflows tuple buffer capacity"
        );
        self.data[self.cursor..self.cursor + row.len()].copy_from_slice(row);
        self.cursor += row.len();
        self.tuple_count += 1;
    }

    /// Freezes the builder into an immutable `TupleBuffer`, stamping the
    /// metadata a producer must set before hand-off (spec.md §3 invariants).
    pub fn finish(self, watermark: Timestamp, sequence_number: SequenceNumber, origin_id: OriginId) -> TupleBuffer {
        let segment = PooledSegment {
            data: Some(self.data),
            on_drop: self.on_drop,
        };
        let len = segment.as_ref().len();
        let bytes = Bytes::from_owner(segment);
        TupleBuffer {
            bytes,
            range: 0..len,
            tuple_count: self.tuple_count,
            watermark,
            sequence_number,
            origin_id,
            creation_timestamp_ms: now_ms(),
        }
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// A reference-counted, immutable view over a pooled segment, carrying the
/// metadata every downstream operator relies on (spec.md §3).
#[derive(Clone)]
pub struct TupleBuffer {
    bytes: Bytes,
    range: Range<usize>,
    tuple_count: usize,
    watermark: Timestamp,
    sequence_number: SequenceNumber,
    origin_id: OriginId,
    creation_timestamp_ms: i64,
}

impl TupleBuffer {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes[self.range.clone()]
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    pub fn tuple_count(&self) -> usize {
        self.tuple_count
    }

    pub fn watermark(&self) -> Timestamp {
        self.watermark
    }

    pub fn sequence_number(&self) -> SequenceNumber {
        self.sequence_number
    }

    pub fn origin_id(&self) -> OriginId {
        self.origin_id
    }

    pub fn creation_timestamp_ms(&self) -> i64 {
        self.creation_timestamp_ms
    }

    /// A child buffer covering a sub-range of this buffer's bytes, sharing
    /// the same underlying segment (spec.md §3: "Child buffers share the
    /// parent's segment... they may cover a sub-range").
    ///
    /// The child inherits the parent's metadata; a compiled pipeline that
    /// slices a buffer (e.g. a filter dropping trailing rows) is expected to
    /// adjust `tuple_count` itself via `with_tuple_count`.
    pub fn slice(&self, sub_range: Range<usize>) -> TupleBuffer {
        assert!(sub_range.end <= self.range.len(), "slice out of bounds");
        let absolute = (self.range.start + sub_range.start)..(self.range.start + sub_range.end);
        TupleBuffer {
            bytes: self.bytes.clone(),
            range: absolute,
            tuple_count: self.tuple_count,
            watermark: self.watermark,
            sequence_number: self.sequence_number,
            origin_id: self.origin_id,
            creation_timestamp_ms: self.creation_timestamp_ms,
        }
    }

    pub fn with_tuple_count(mut self, tuple_count: usize) -> Self {
        self.tuple_count = tuple_count;
        self
    }

    /// Strict per-origin ordering (spec.md §3): a buffer with sequence
    /// number *s* from origin *o* is ordered strictly after all buffers with
    /// smaller sequence numbers from the same origin.
    pub fn orders_after(&self, other: &TupleBuffer) -> bool {
        self.origin_id == other.origin_id && self.sequence_number > other.sequence_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unpooled(size: usize) -> TupleBufferBuilder {
        TupleBufferBuilder::new_unpooled(vec![0u8; size])
    }

    #[test]
    fn finish_stamps_metadata() {
        let mut builder = unpooled(16);
        builder.write_row(b"12345678");
        let buffer = builder.finish(100, 7, 3);
        assert_eq!(buffer.tuple_count(), 1);
        assert_eq!(buffer.watermark(), 100);
        assert_eq!(buffer.sequence_number(), 7);
        assert_eq!(buffer.origin_id(), 3);
    }

    #[test]
    fn slice_shares_metadata_and_bytes() {
        let mut builder = unpooled(16);
        builder.write_row(b"abcd");
        builder.write_row(b"efgh");
        let buffer = builder.finish(1, 1, 1);
        let child = buffer.slice(0..4);
        assert_eq!(child.bytes(), b"abcd");
        assert_eq!(child.origin_id(), buffer.origin_id());
    }

    #[test]
    fn ordering_is_per_origin() {
        let a = unpooled(1).finish(0, 5, 1);
        let b = unpooled(1).finish(0, 6, 1);
        let c = unpooled(1).finish(0, 100, 2);
        assert!(b.orders_after(&a));
        assert!(!a.orders_after(&b));
        assert!(!c.orders_after(&a));
    }

    #[test]
    #[should_panic(expected = "overflow")]
    fn write_row_overflow_panics() {
        let mut builder = unpooled(4);
        builder.write_row(b"12345");
    }
}
