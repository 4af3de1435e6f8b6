// Copyright (c) NebulaStream Contributors
// SPDX-License-Identifier: Apache-2.0

//! The unit of work a worker thread dequeues (spec.md §3 "Data flow": "A
//! source posts a task `(buffer, successor pipeline)`... Sources and
//! reconfiguration produce control events that flow through the same task
//! queue as data.").

use crate::buffer::TupleBuffer;
use crate::pipeline::plan::{DecomposedQueryId, Successor};
use crate::query_manager::reconfiguration::ReconfigurationMessage;

#[derive(Clone)]
pub enum Task {
    Data {
        decomposed_query_id: DecomposedQueryId,
        target: Successor,
        buffer: TupleBuffer,
    },
    Reconfiguration(ReconfigurationMessage),
}
