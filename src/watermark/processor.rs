// Copyright (c) NebulaStream Contributors
// SPDX-License-Identifier: Apache-2.0

//! `WatermarkProcessor`: per-operator watermark state (spec.md §3 "Watermark
//! processor", §8 "Watermark monotonicity").

use dashmap::DashMap;

use crate::buffer::{OriginId, Timestamp};
use crate::pipeline::handlers::{OperatorHandlerApi, OperatorHandlerKind};

/// Tracks the current watermark per origin and exposes the merged output
/// watermark, the minimum over every origin that has reported at least once
/// (spec.md §3 invariant). Monotonicity of the merged watermark (spec.md §8)
/// follows from two preconditions this type assumes and does not itself
/// enforce: each origin's own reports are non-decreasing, and an operator's
/// origin set is fixed once data starts flowing (no origin joins after the
/// merged watermark has already passed its would-be reports).
pub struct WatermarkProcessor {
    per_origin: DashMap<OriginId, Timestamp>,
}

impl WatermarkProcessor {
    pub fn new() -> Self {
        Self {
            per_origin: DashMap::new(),
        }
    }

    /// Records a new watermark report from `origin`. A report below the
    /// origin's current watermark is ignored rather than applied, guarding
    /// the per-origin monotonicity precondition above against a
    /// misbehaving or reordered source.
    pub fn update(&self, origin: OriginId, watermark: Timestamp) {
        self.per_origin
            .entry(origin)
            .and_modify(|current| *current = (*current).max(watermark))
            .or_insert(watermark);
    }

    pub fn merged_watermark(&self) -> Option<Timestamp> {
        self.per_origin.iter().map(|entry| *entry.value()).min()
    }

    pub fn origin_count(&self) -> usize {
        self.per_origin.len()
    }

    pub fn watermark_for(&self, origin: OriginId) -> Option<Timestamp> {
        self.per_origin.get(&origin).map(|v| *v)
    }
}

impl Default for WatermarkProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl OperatorHandlerApi for WatermarkProcessor {
    fn handler_kind(&self) -> OperatorHandlerKind {
        OperatorHandlerKind::Watermark
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_is_min_over_reporting_origins() {
        let processor = WatermarkProcessor::new();
        processor.update(1, 100);
        processor.update(2, 50);
        assert_eq!(processor.merged_watermark(), Some(50));
        processor.update(2, 150);
        assert_eq!(processor.merged_watermark(), Some(100));
    }

    #[test]
    fn no_origins_means_no_merged_watermark() {
        let processor = WatermarkProcessor::new();
        assert_eq!(processor.merged_watermark(), None);
    }

    #[test]
    fn regression_from_a_single_origin_is_ignored() {
        let processor = WatermarkProcessor::new();
        processor.update(1, 100);
        processor.update(1, 10);
        assert_eq!(processor.watermark_for(1), Some(100));
    }
}
