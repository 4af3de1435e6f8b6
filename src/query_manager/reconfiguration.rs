// Copyright (c) NebulaStream Contributors
// SPDX-License-Identifier: Apache-2.0

//! Reconfiguration message envelope (spec.md §4.6; SPEC_FULL.md §3
//! "Thread-pool-wide poison vs per-plan stop", "`injectEpochBarrier`").

use crate::buffer::{OriginId, Timestamp};
use crate::pipeline::plan::{DecomposedQueryId, SourceOperatorId, Successor};
use crate::watermark::{MarkerId, ReconfigurationMarker};

/// How a `stop` request should be carried out (spec.md §3 "Lifecycle":
/// `Finished`, `Stopped`, `ErrorState`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopKind {
    /// Drain in-flight data via a `DrainQuery` marker, then transition to
    /// `Finished` once every sink has converged.
    Graceful,
    /// Transition to `Stopped` immediately; in-flight tasks for the EQP are
    /// dropped as workers dequeue them (spec.md §5: the worker checks the
    /// EQP's state before invoking a pipeline).
    Hard,
    /// Transition to `ErrorState` immediately (spec.md §7 `PipelineFailure`,
    /// `SinkFailure`, `SourceFailure`).
    Failure,
}

#[derive(Debug, Clone)]
pub enum ReconfigurationMessage {
    Start {
        decomposed_query_id: DecomposedQueryId,
    },
    Stop {
        decomposed_query_id: DecomposedQueryId,
        kind: StopKind,
    },
    Fail {
        decomposed_query_id: DecomposedQueryId,
        reason: String,
    },
    UpdateWatermark {
        decomposed_query_id: DecomposedQueryId,
        origin: OriginId,
        watermark: Timestamp,
    },
    /// Begins a graceful drain: a `DrainQuery` marker is injected at every
    /// source and walked forward to every reachable sink.
    Drain {
        decomposed_query_id: DecomposedQueryId,
    },
    PropagateMarker {
        decomposed_query_id: DecomposedQueryId,
        target: Successor,
        marker: ReconfigurationMarker,
        id: MarkerId,
        injecting_source: SourceOperatorId,
    },
    /// Backward epoch-barrier pass (SPEC_FULL.md §3, grounded on the
    /// original's `injectEpochBarrier`/`propagateEpochBackwards`).
    EpochTrim {
        decomposed_query_id: DecomposedQueryId,
        epoch: u64,
    },
}

impl ReconfigurationMessage {
    pub fn decomposed_query_id(&self) -> DecomposedQueryId {
        match self {
            ReconfigurationMessage::Start { decomposed_query_id }
            | ReconfigurationMessage::Stop { decomposed_query_id, .. }
            | ReconfigurationMessage::Fail { decomposed_query_id, .. }
            | ReconfigurationMessage::UpdateWatermark { decomposed_query_id, .. }
            | ReconfigurationMessage::Drain { decomposed_query_id }
            | ReconfigurationMessage::PropagateMarker { decomposed_query_id, .. }
            | ReconfigurationMessage::EpochTrim { decomposed_query_id, .. } => *decomposed_query_id,
        }
    }
}
