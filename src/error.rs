// Copyright (c) NebulaStream Contributors
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

use crate::pipeline::plan::DecomposedQueryId;

/// Error kinds surfaced to the executable-query-plan lifecycle (spec.md §7).
///
/// Every variant maps onto exactly one of the lifecycle transitions the query
/// manager performs: `ResourceExhausted` and `SourceFailure`/`PipelineFailure`/
/// `SinkFailure` drive an EQP into `ErrorState`, `InvalidPlan` keeps it stuck
/// in `Created`, and `Timeout` escalates a graceful stop into a hard one.
#[derive(Error, Debug, Clone)]
pub enum ExecutionError {
    #[error("resource exhausted for decomposed query {decomposed_query_id}: {reason}")]
    ResourceExhausted {
        decomposed_query_id: DecomposedQueryId,
        reason: String,
    },

    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    #[error("source failure in decomposed query {decomposed_query_id}: {reason}")]
    SourceFailure {
        decomposed_query_id: DecomposedQueryId,
        reason: String,
    },

    #[error("pipeline failure in decomposed query {decomposed_query_id}, pipeline {pipeline_id}: {reason}")]
    PipelineFailure {
        decomposed_query_id: DecomposedQueryId,
        pipeline_id: u64,
        reason: String,
    },

    #[error("sink failure in decomposed query {decomposed_query_id}: {reason}")]
    SinkFailure {
        decomposed_query_id: DecomposedQueryId,
        reason: String,
    },

    #[error("graceful stop of decomposed query {decomposed_query_id} timed out")]
    Timeout { decomposed_query_id: DecomposedQueryId },

    /// A queue or barrier was torn down while a caller was still waiting on it.
    #[error("query manager is shutting down")]
    Poisoned,
}

pub type ExecutionResult<T> = std::result::Result<T, ExecutionError>;
