// Copyright (c) NebulaStream Contributors
// SPDX-License-Identifier: Apache-2.0

//! `WindowOperatorHandler`: the per-operator state a window pipeline reaches
//! through `PipelineContext::handler` (spec.md §3 "Window operator handler",
//! §4.4).

use crate::buffer::Timestamp;
use crate::pipeline::handlers::{OperatorHandlerApi, OperatorHandlerKind};
use crate::windowing::aggregation::{AggregateValue, AggregationKind, DynamicAggregation};
use crate::windowing::slice::SliceAssigner;
use crate::windowing::slice_store::SliceStore;
use crate::windowing::window::Window;

/// A grouping key. `Unkeyed` is the "possibly unkeyed = single bucket" case
/// spec.md §4.4 calls out explicitly; `Int`/`Composite` cover single- and
/// multi-column `GROUP BY`-style keys without requiring a type parameter on
/// `OperatorHandler` (see `aggregation::DynamicAggregation` for why).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupKey {
    Unkeyed,
    Int(i64),
    Composite(Vec<i64>),
}

/// Owns the slice store for one window operator instance and runs the
/// triggering algorithm on watermark advance (spec.md §4.4 "Triggering",
/// §4.6 "the operator's merged watermark").
pub struct WindowOperatorHandler {
    store: SliceStore<GroupKey, DynamicAggregation>,
    last_triggered_watermark: parking_lot::Mutex<Timestamp>,
}

impl WindowOperatorHandler {
    pub fn new(size: Timestamp, slide: Timestamp, kind: AggregationKind) -> Self {
        Self {
            store: SliceStore::new(SliceAssigner::new(size, slide), DynamicAggregation(kind)),
            last_triggered_watermark: parking_lot::Mutex::new(Timestamp::MIN),
        }
    }

    pub fn assigner(&self) -> &SliceAssigner {
        self.store.assigner()
    }

    /// Spec.md §4.4 "Slice store" steps 1–3: locate/create the slice
    /// containing `timestamp`, combine the lifted partial, bump the record
    /// count.
    pub fn ingest(&self, key: GroupKey, timestamp: Timestamp, value: AggregateValue) {
        self.store.ingest(key, timestamp, value);
    }

    /// Runs the triggering algorithm for a merged-watermark advance to `w`
    /// (spec.md §4.4). Idempotent: re-triggering at the same or an older
    /// watermark than the last call returns nothing, since `SliceStore`
    /// tracks already-emitted windows itself.
    pub fn on_watermark_advance(&self, watermark: Timestamp) -> Vec<(GroupKey, Window, AggregateValue)> {
        let mut last = self.last_triggered_watermark.lock();
        if watermark <= *last {
            return Vec::new();
        }
        *last = watermark;
        self.store.trigger(watermark)
    }

    pub fn key_count(&self) -> usize {
        self.store.key_count()
    }
}

impl OperatorHandlerApi for WindowOperatorHandler {
    fn handler_kind(&self) -> OperatorHandlerKind {
        OperatorHandlerKind::Window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tumbling_sum_emits_on_watermark_advance() {
        let handler = WindowOperatorHandler::new(1000, 1000, AggregationKind::Sum);
        for _ in 0..170 {
            handler.ingest(GroupKey::Unkeyed, 1, AggregateValue::I64(1));
        }
        assert!(handler.on_watermark_advance(500).is_empty());
        let results = handler.on_watermark_advance(1000);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].1, Window::new(0, 1000));
        assert_eq!(results[0].2, AggregateValue::I64(170));
    }

    #[test]
    fn re_triggering_at_same_watermark_is_a_no_op() {
        let handler = WindowOperatorHandler::new(10, 10, AggregationKind::Count);
        handler.ingest(GroupKey::Int(1), 1, AggregateValue::U64(1));
        assert_eq!(handler.on_watermark_advance(10).len(), 1);
        assert!(handler.on_watermark_advance(10).is_empty());
        assert!(handler.on_watermark_advance(5).is_empty());
    }

    #[test]
    fn handler_kind_is_window() {
        let handler = WindowOperatorHandler::new(10, 10, AggregationKind::Sum);
        assert_eq!(handler.handler_kind(), OperatorHandlerKind::Window);
    }
}
