// Copyright (c) NebulaStream Contributors
// SPDX-License-Identifier: Apache-2.0

//! End-to-end exercise of scenario 4 (spec.md §8 "Concrete scenarios"):
//! register `source -> filter -> sink`, start it, push three buffers
//! through, issue a graceful stop, and check the EQP reaches `Finished`,
//! the sink saw exactly three buffers in order, and the buffer pool is
//! back to full once every buffer has been released.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use nebula_execution_core::buffer::{Layout, Schema, SequenceNumber, Timestamp, TupleBuffer};
use nebula_execution_core::config::{BufferPoolConfig, DispatchMode, JoinConfig, WorkerPoolConfig};
use nebula_execution_core::context::ExecutionContext;
use nebula_execution_core::error::ExecutionResult;
use nebula_execution_core::pipeline::handlers::OperatorHandlerArena;
use nebula_execution_core::pipeline::plan::{
    DecomposedQueryId, EqpState, ExecutableQueryPlan, PipelineId, PipelineNode, PlanVersion,
    SharedQueryId, SinkBinding, SinkOperatorId, SourceBinding, SourceOperatorId, Successor,
};
use nebula_execution_core::pipeline::stage::{FnStage, PipelineContext, StageResult, WorkerContext};
use nebula_execution_core::query_manager::{QueryManager, ReconfigurationMessage, StopKind};
use nebula_execution_core::source_sink::Sink;

/// A durable-write stand-in: records sequence numbers, never retains the
/// buffer itself, so the pooled segment is free to return to the pool as
/// soon as the worker thread drops its copy.
struct RecordingSink {
    id: SinkOperatorId,
    received: Mutex<Vec<SequenceNumber>>,
}

impl Sink for RecordingSink {
    fn id(&self) -> SinkOperatorId {
        self.id
    }

    fn write_buffer(&self, buffer: &TupleBuffer) -> ExecutionResult<()> {
        self.received.lock().unwrap().push(buffer.sequence_number());
        Ok(())
    }

    fn notify_epoch_termination(&self, _epoch: Timestamp) -> ExecutionResult<()> {
        Ok(())
    }

    fn update_watermark(&self, _watermark: Timestamp) -> ExecutionResult<()> {
        Ok(())
    }
}

fn empty_schema() -> Schema {
    Schema::new(vec![], Layout::RowMajor)
}

fn wait_until(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn graceful_stop_drains_every_buffer_then_finishes() {
    let context = ExecutionContext::new(
        BufferPoolConfig {
            buffer_size_bytes: 64,
            global_pool_buffers: 8,
            per_source_local_pool_buffers: 2,
            per_worker_pool_buffers: 2,
            acquire_timeout_ms: 500,
        },
        WorkerPoolConfig {
            dispatch_mode: DispatchMode::MultiQueue {
                num_queues: 1,
                threads_per_queue: 2,
            },
            task_queue_capacity: 16,
            worker_poll_timeout_ms: 5,
        },
        JoinConfig::default(),
    );

    let decomposed_query_id = DecomposedQueryId(1);
    let source_id = SourceOperatorId(1);
    let sink_id = SinkOperatorId(1);
    let filter_pipeline_id = PipelineId(1);

    let passed_through = Arc::new(AtomicUsize::new(0));
    let counter = passed_through.clone();
    let filter_stage = FnStage::new(
        move |input: &TupleBuffer, ctx: &mut PipelineContext<'_>, _worker_ctx: &mut WorkerContext| {
            counter.fetch_add(1, Ordering::SeqCst);
            ctx.emit(input.clone());
            StageResult::Ok
        },
    );

    let plan = ExecutableQueryPlan::new(
        SharedQueryId(1),
        decomposed_query_id,
        PlanVersion(0),
        vec![SourceBinding {
            id: source_id,
            successors: vec![filter_pipeline_id],
            schema: empty_schema(),
        }],
        vec![SinkBinding {
            id: sink_id,
            schema: empty_schema(),
        }],
        HashMap::from([(
            filter_pipeline_id,
            PipelineNode {
                id: filter_pipeline_id,
                stage: filter_stage,
                successors: vec![Successor::Sink(sink_id)],
                handler_ids: vec![],
                output_schema: empty_schema(),
            },
        )]),
        OperatorHandlerArena::new(),
    )
    .expect("plan is structurally valid");

    let manager = QueryManager::new(&context);
    let sink = Arc::new(RecordingSink {
        id: sink_id,
        received: Mutex::new(Vec::new()),
    });

    manager
        .register_executable_query_plan(
            Arc::new(plan),
            HashMap::from([(sink_id, sink.clone() as Arc<dyn Sink>)]),
        )
        .expect("registration succeeds");
    manager.start(decomposed_query_id).expect("start succeeds");

    let buffer_pool = manager.buffer_pool();
    let initial_free = buffer_pool.free_count();

    for sequence_number in 0..3u64 {
        let buffer = buffer_pool.acquire().finish(0, sequence_number, source_id.0);
        manager
            .add_work_for_next_pipeline(decomposed_query_id, Successor::Pipeline(filter_pipeline_id), buffer)
            .expect("posting work succeeds");
    }

    assert!(
        wait_until(|| sink.received.lock().unwrap().len() == 3, Duration::from_secs(2)),
        "sink should have received all three buffers"
    );
    assert_eq!(*sink.received.lock().unwrap(), vec![0, 1, 2]);
    assert_eq!(passed_through.load(Ordering::SeqCst), 3);

    manager
        .add_reconfiguration_message(ReconfigurationMessage::Stop { decomposed_query_id, kind: StopKind::Graceful }, true)
        .expect("graceful stop succeeds");

    assert_eq!(manager.plan(decomposed_query_id).unwrap().state(), EqpState::Finished);

    assert!(
        wait_until(|| buffer_pool.free_count() == initial_free, Duration::from_secs(2)),
        "every acquired buffer should have returned to the pool"
    );

    manager.shutdown();
}
