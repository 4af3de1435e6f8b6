// Copyright (c) NebulaStream Contributors
// SPDX-License-Identifier: Apache-2.0

//! Source and sink contracts, and the logical catalog metadata the core
//! reads but never mutates (spec.md §6.1–§6.3 "External interfaces").
//!
//! Sources and sinks are explicitly out-of-scope collaborators (spec.md §1):
//! this module defines only the interfaces the core consumes, not an
//! implementation of any concrete connector.

use crate::buffer::{Schema, Timestamp, TupleBuffer};
use crate::error::ExecutionResult;
use crate::pipeline::plan::{SinkOperatorId, SourceOperatorId};
use crate::query_manager::reconfiguration::StopKind;

/// `(name, schema)` (spec.md §6.1).
#[derive(Debug, Clone)]
pub struct LogicalSource {
    pub name: String,
    pub schema: Schema,
}

/// `(name, schema, sinkType, config)` (spec.md §6.1). `sink_type`/`config`
/// are opaque strings here; interpreting them is a connector's job.
#[derive(Debug, Clone)]
pub struct LogicalSink {
    pub name: String,
    pub schema: Schema,
    pub sink_type: String,
    pub config: String,
}

/// Binds a `LogicalSource` to a physical source implementation (spec.md
/// §6.1 "A physical source binds a logical source to (sourceType,
/// parserConfig, typeSpecificConfig)").
#[derive(Debug, Clone)]
pub struct PhysicalSourceBinding {
    pub source_type: String,
    pub parser_config: String,
    pub type_specific_config: String,
}

/// Producer-side contract a source implementation satisfies (spec.md §6.2).
/// `start`/`stop` are invoked by the query manager; `emit_buffer` is called
/// by the source's own implementation to hand a stamped buffer to its
/// successor pipeline (i.e. the source calls into the query manager, not the
/// other way around — this trait exists for the query manager's side of
/// that relationship: starting and stopping the source).
pub trait Source: Send + Sync {
    fn id(&self) -> SourceOperatorId;
    fn start(&self) -> ExecutionResult<()>;
    fn stop(&self, kind: StopKind) -> ExecutionResult<()>;
}

/// Consumer-side contract a sink implementation satisfies (spec.md §6.3).
pub trait Sink: Send + Sync {
    fn id(&self) -> SinkOperatorId;
    /// Durable write of one buffer.
    fn write_buffer(&self, buffer: &TupleBuffer) -> ExecutionResult<()>;
    /// Acknowledges an epoch barrier (SPEC_FULL.md §3 `EpochTrim`).
    fn notify_epoch_termination(&self, epoch: Timestamp) -> ExecutionResult<()>;
    /// Records the watermark carried by the most recently written buffer.
    fn update_watermark(&self, watermark: Timestamp) -> ExecutionResult<()>;
}
