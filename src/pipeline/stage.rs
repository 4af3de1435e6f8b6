// Copyright (c) NebulaStream Contributors
// SPDX-License-Identifier: Apache-2.0

//! The executable pipeline stage contract (spec.md §4.2).
//!
//! The core treats `execute` as opaque — in a full deployment it is a
//! Nautilus-compiled function object, which is explicitly out of scope
//! (spec.md §1). `ExecutablePipelineStage` is the uniform invocation
//! interface the core consumes; built-in stages (filter, map, window
//! aggregate, join probe) implement it directly so the rest of this crate
//! has something concrete to dispatch and test against.

use std::sync::Arc;

use crate::buffer::{LocalBufferPool, TupleBuffer, VariableSizedDataArena};
use crate::pipeline::handlers::{OperatorHandlerArena, OperatorHandlerId};
use crate::pipeline::plan::Successor;

/// The tri-state result a compiled pipeline stage returns (spec.md §4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageResult {
    Ok,
    Error(String),
    Finished,
}

/// Per-worker scratch state (spec.md §4.1 "per-worker pools").
pub struct WorkerContext {
    pub worker_id: usize,
    pub local_pool: LocalBufferPool,
}

/// Context passed to a compiled stage, giving it the three callbacks
/// spec.md §4.2 allows: emit an output buffer, access operator handlers by
/// index, and allocate arena memory.
pub struct PipelineContext<'a> {
    handlers: &'a OperatorHandlerArena,
    arena: &'a mut VariableSizedDataArena,
    outputs: Vec<(Successor, TupleBuffer)>,
    default_successors: &'a [Successor],
}

impl<'a> PipelineContext<'a> {
    pub fn new(
        handlers: &'a OperatorHandlerArena,
        arena: &'a mut VariableSizedDataArena,
        default_successors: &'a [Successor],
    ) -> Self {
        Self {
            handlers,
            arena,
            outputs: Vec::new(),
            default_successors,
        }
    }

    /// Emits a buffer to every successor the pipeline is wired to. A stage
    /// that needs to address a specific successor (e.g. a join routing
    /// build-side vs. probe-side output) should use `emit_to` instead.
    pub fn emit(&mut self, buffer: TupleBuffer) {
        for successor in self.default_successors {
            self.outputs.push((*successor, buffer.clone()));
        }
    }

    pub fn emit_to(&mut self, successor: Successor, buffer: TupleBuffer) {
        self.outputs.push((successor, buffer));
    }

    pub fn handler(&self, id: OperatorHandlerId) -> &crate::pipeline::handlers::OperatorHandler {
        self.handlers.get(id)
    }

    pub fn arena_mut(&mut self) -> &mut VariableSizedDataArena {
        self.arena
    }

    pub fn into_outputs(self) -> Vec<(Successor, TupleBuffer)> {
        self.outputs
    }
}

/// A pure, thread-safe function object invoked on `(input, context,
/// worker context)` (spec.md §4.2). Pipelines are stateless; all mutable
/// state lives in operator handlers reached through `PipelineContext`.
pub trait ExecutablePipelineStage: Send + Sync {
    fn execute(
        &self,
        input: &TupleBuffer,
        ctx: &mut PipelineContext<'_>,
        worker_ctx: &mut WorkerContext,
    ) -> StageResult;
}

/// Wraps a closure as a stage, for simple stateless operators (filter, map)
/// that need no handler access.
pub struct FnStage<F>(F)
where
    F: Fn(&TupleBuffer, &mut PipelineContext<'_>, &mut WorkerContext) -> StageResult + Send + Sync;

impl<F> FnStage<F>
where
    F: Fn(&TupleBuffer, &mut PipelineContext<'_>, &mut WorkerContext) -> StageResult + Send + Sync,
{
    pub fn new(f: F) -> Arc<Self> {
        Arc::new(Self(f))
    }
}

impl<F> ExecutablePipelineStage for FnStage<F>
where
    F: Fn(&TupleBuffer, &mut PipelineContext<'_>, &mut WorkerContext) -> StageResult + Send + Sync,
{
    fn execute(
        &self,
        input: &TupleBuffer,
        ctx: &mut PipelineContext<'_>,
        worker_ctx: &mut WorkerContext,
    ) -> StageResult {
        (self.0)(input, ctx, worker_ctx)
    }
}
