// Copyright (c) NebulaStream Contributors
// SPDX-License-Identifier: Apache-2.0

pub mod handlers;
pub mod plan;
pub mod stage;

pub use handlers::{OperatorHandler, OperatorHandlerArena, OperatorHandlerId, OperatorHandlerKind};
pub use plan::{
    DecomposedQueryId, EqpState, ExecutableQueryPlan, PipelineId, PipelineNode, PlanVersion,
    SharedQueryId, SinkBinding, SinkOperatorId, SourceBinding, SourceOperatorId, Successor,
};
pub use stage::{ExecutablePipelineStage, FnStage, PipelineContext, StageResult, WorkerContext};
