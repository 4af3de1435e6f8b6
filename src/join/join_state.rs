// Copyright (c) NebulaStream Contributors
// SPDX-License-Identifier: Apache-2.0

//! `JoinOperatorHandler`: per-window, per-side build state and the two-phase
//! build/probe protocol (spec.md §3 "Join state", §4.5 "Stream join").
//!
//! Per-window state is guarded by one `parking_lot::Mutex` per window rather
//! than fully thread-local per-worker build tables — a scoping decision
//! recorded in `DESIGN.md`: true per-worker staging needs a build-phase-end
//! signal threaded through `WorkerContext`, which this crate does not wire
//! up. Contention is still low because locks are per-window, not global, and
//! the build/probe visibility invariant (spec.md §3: "visible to every probe
//! on the opposite side for window W once W's build phase ends, and never
//! before") holds regardless of staging strategy.

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::config::JoinConfig;
use crate::error::{ExecutionError, ExecutionResult};
use crate::join::hash_table::PartitionedTable;
use crate::pipeline::handlers::{OperatorHandlerApi, OperatorHandlerKind};
use crate::pipeline::plan::DecomposedQueryId;
use crate::windowing::window::Window;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinSide {
    Left,
    Right,
}

/// Where the join key and the whole record live within a fixed-size row.
#[derive(Debug, Clone, Copy)]
pub struct JoinRecordLayout {
    pub key_offset: usize,
    pub key_size: usize,
    pub record_size: usize,
}

impl JoinRecordLayout {
    pub fn key_of<'a>(&self, record: &'a [u8]) -> &'a [u8] {
        &record[self.key_offset..self.key_offset + self.key_size]
    }
}

struct JoinWindowState {
    left: PartitionedTable,
    right: PartitionedTable,
    bytes_used: usize,
}

impl JoinWindowState {
    fn new(num_partitions: usize, page_capacity_records: usize, left_layout: &JoinRecordLayout, right_layout: &JoinRecordLayout) -> Self {
        Self {
            left: PartitionedTable::new(num_partitions, left_layout.record_size, page_capacity_records),
            right: PartitionedTable::new(num_partitions, right_layout.record_size, page_capacity_records),
            bytes_used: 0,
        }
    }
}

/// One joined output row: `(windowStart, windowEnd, key, leftRecord,
/// rightRecord)` (spec.md §4.5 phase 2 step 3).
pub struct JoinedRecord {
    pub window: Window,
    pub key: Vec<u8>,
    pub left: Vec<u8>,
    pub right: Vec<u8>,
}

impl JoinedRecord {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16 + self.key.len() + self.left.len() + self.right.len());
        out.extend_from_slice(&self.window.start.to_le_bytes());
        out.extend_from_slice(&self.window.end.to_le_bytes());
        out.extend_from_slice(&self.key);
        out.extend_from_slice(&self.left);
        out.extend_from_slice(&self.right);
        out
    }
}

pub struct JoinOperatorHandler {
    decomposed_query_id: DecomposedQueryId,
    left_layout: JoinRecordLayout,
    right_layout: JoinRecordLayout,
    num_partitions: usize,
    page_capacity_records: usize,
    join_size_in_bytes: usize,
    windows: DashMap<Window, Mutex<JoinWindowState>>,
}

fn default_page_capacity(config: &JoinConfig, record_size: usize) -> usize {
    (config.page_size_bytes / record_size).max(1)
}

impl JoinOperatorHandler {
    pub fn new(
        decomposed_query_id: DecomposedQueryId,
        left_layout: JoinRecordLayout,
        right_layout: JoinRecordLayout,
        config: &JoinConfig,
    ) -> Self {
        assert_eq!(left_layout.key_size, right_layout.key_size, "join keys must be the same size on both sides");
        let page_capacity_records = default_page_capacity(config, left_layout.record_size.max(right_layout.record_size));
        Self {
            decomposed_query_id,
            left_layout,
            right_layout,
            num_partitions: config.num_partitions,
            page_capacity_records,
            join_size_in_bytes: config.join_size_in_bytes,
            windows: DashMap::new(),
        }
    }

    /// Build-phase insert for one record on `side`, into the window it falls
    /// into (spec.md §4.5 "Two phases per window"). Enforces the per-window
    /// `joinSizeInByte` budget (spec.md §4.5 "Configuration").
    pub fn build(&self, side: JoinSide, window: Window, record: &[u8]) -> ExecutionResult<()> {
        let layout = match side {
            JoinSide::Left => &self.left_layout,
            JoinSide::Right => &self.right_layout,
        };
        debug_assert_eq!(record.len(), layout.record_size);
        let key = layout.key_of(record).to_vec();

        let shard = self
            .windows
            .entry(window)
            .or_insert_with(|| Mutex::new(JoinWindowState::new(self.num_partitions, self.page_capacity_records, &self.left_layout, &self.right_layout)));
        let mut state = shard.lock();
        state.bytes_used += record.len();
        if state.bytes_used > self.join_size_in_bytes {
            return Err(ExecutionError::ResourceExhausted {
                decomposed_query_id: self.decomposed_query_id,
                reason: format!("join window {window:?} exceeded joinSizeInByte={}", self.join_size_in_bytes),
            });
        }
        match side {
            JoinSide::Left => state.left.insert(&key, record),
            JoinSide::Right => state.right.insert(&key, record),
        }
        Ok(())
    }

    /// Closes `window`'s build phase and returns every joined pair (spec.md
    /// §4.5 phase 2). A window with no build-side activity yields no rows.
    /// Idempotent: a window already probed (and thus removed) yields nothing
    /// on a second call.
    pub fn probe(&self, window: Window) -> Vec<JoinedRecord> {
        let Some((_, state)) = self.windows.remove(&window) else {
            return Vec::new();
        };
        let state = state.into_inner();
        let mut output = Vec::new();

        // spec.md §4.5 phase 2 step 2: scan the smaller side, probe the
        // larger. Partitioning is consistent across sides (same hash, same
        // partition count), so matches only ever occur within the same
        // partition index.
        let scan_left = state.left.len() <= state.right.len();
        for partition in 0..self.num_partitions {
            let left_bucket = state.left.bucket(partition);
            let right_bucket = state.right.bucket(partition);
            if scan_left {
                for left_record in left_bucket.records() {
                    let key = self.left_layout.key_of(left_record);
                    for right_record in right_bucket.records() {
                        if self.right_layout.key_of(right_record) == key {
                            output.push(JoinedRecord {
                                window,
                                key: key.to_vec(),
                                left: left_record.to_vec(),
                                right: right_record.to_vec(),
                            });
                        }
                    }
                }
            } else {
                for right_record in right_bucket.records() {
                    let key = self.right_layout.key_of(right_record);
                    for left_record in left_bucket.records() {
                        if self.left_layout.key_of(left_record) == key {
                            output.push(JoinedRecord {
                                window,
                                key: key.to_vec(),
                                left: left_record.to_vec(),
                                right: right_record.to_vec(),
                            });
                        }
                    }
                }
            }
        }
        output
    }

    pub fn open_window_count(&self) -> usize {
        self.windows.len()
    }
}

impl OperatorHandlerApi for JoinOperatorHandler {
    fn handler_kind(&self) -> OperatorHandlerKind {
        OperatorHandlerKind::Join
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> JoinRecordLayout {
        // key(8) | id(8)
        JoinRecordLayout {
            key_offset: 0,
            key_size: 8,
            record_size: 16,
        }
    }

    fn record(key: u64, id: u64) -> Vec<u8> {
        let mut out = Vec::with_capacity(16);
        out.extend_from_slice(&key.to_le_bytes());
        out.extend_from_slice(&id.to_le_bytes());
        out
    }

    #[test]
    fn sliding_join_cross_product_within_window() {
        let config = JoinConfig {
            page_size_bytes: 1024,
            num_partitions: 4,
            join_size_in_bytes: 1 << 20,
        };
        let handler = JoinOperatorHandler::new(DecomposedQueryId::new_for_test(1), layout(), layout(), &config);
        let window = Window::new(0, 1000);
        for k in 0..10 {
            handler.build(JoinSide::Left, window, &record(1, k)).unwrap();
            handler.build(JoinSide::Right, window, &record(1, k)).unwrap();
        }
        let joined = handler.probe(window);
        assert_eq!(joined.len(), 100, "10x10 cross product on the shared key");
        assert!(handler.probe(window).is_empty(), "window already closed");
    }

    #[test]
    fn join_size_budget_triggers_resource_exhausted() {
        let config = JoinConfig {
            page_size_bytes: 1024,
            num_partitions: 1,
            join_size_in_bytes: 16,
        };
        let handler = JoinOperatorHandler::new(DecomposedQueryId::new_for_test(1), layout(), layout(), &config);
        let window = Window::new(0, 1000);
        handler.build(JoinSide::Left, window, &record(1, 0)).unwrap();
        let result = handler.build(JoinSide::Left, window, &record(1, 1));
        assert!(matches!(result, Err(ExecutionError::ResourceExhausted { .. })));
    }

    #[test]
    fn page_overflow_scenario_preserves_every_pair() {
        // spec.md §8 scenario 6, extended to a join probe.
        let config = JoinConfig {
            page_size_bytes: 32, // pageSize = 2 * recordSize(16)
            num_partitions: 1,
            join_size_in_bytes: 1 << 20,
        };
        let handler = JoinOperatorHandler::new(DecomposedQueryId::new_for_test(1), layout(), layout(), &config);
        let window = Window::new(0, 1000);
        for i in 0..100 {
            handler.build(JoinSide::Left, window, &record(1, i)).unwrap();
        }
        handler.build(JoinSide::Right, window, &record(1, 999)).unwrap();
        let joined = handler.probe(window);
        assert_eq!(joined.len(), 100);
    }
}
