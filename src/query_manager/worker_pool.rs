// Copyright (c) NebulaStream Contributors
// SPDX-License-Identifier: Apache-2.0

//! The worker thread pool (spec.md §3 "Worker thread pool", §4.3
//! "Scheduling model").
//!
//! Generalizes the teacher's single `core_thread.rs` OS thread + bounded
//! channel + blocking-recv loop (`CoreThreadDispatcher::start`/`CoreThread::run`)
//! to N threads pulling from one or more MPMC queues, synchronously: spec.md
//! §5 requires a worker to block on an empty queue rather than `.await`
//! inside a pipeline invocation, so there is no async runtime here at all.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, SendError};
use prometheus::{IntGauge, Opts};
use tracing::{debug, trace};

use crate::buffer::BufferPool;
use crate::config::WorkerPoolConfig;
use crate::metered_queue::{metered_bounded, MeteredReceiver, MeteredSender};
use crate::metrics::Metrics;
use crate::pipeline::stage::WorkerContext;
use crate::query_manager::task::Task;

/// What a worker thread does with a dequeued task. Implemented by the query
/// manager's internal dispatcher; kept as a trait so `WorkerPool` does not
/// need to know about `ExecutableQueryPlan` or the operator-handler arena.
pub trait TaskRunner: Send + Sync + 'static {
    fn run(&self, task: Task, worker_ctx: &mut WorkerContext);
}

/// What a worker thread should do after one pass through its recv loop
/// (SPEC_FULL.md §3 "processNextTask/TaskOutcome"). A dedicated type rather
/// than inlining the match keeps the poll loop's control flow legible and
/// gives the per-worker_id debug line below a single place to hang off.
enum TaskOutcome {
    Ran,
    Idle,
    QueuePoisoned,
}

fn process_next_task(
    rx: &MeteredReceiver<Task>,
    runner: &Arc<dyn TaskRunner>,
    worker_ctx: &mut WorkerContext,
    poll_timeout: Duration,
) -> TaskOutcome {
    match rx.recv_timeout(poll_timeout) {
        Ok(task) => {
            runner.run(task, worker_ctx);
            TaskOutcome::Ran
        }
        Err(RecvTimeoutError::Timeout) => TaskOutcome::Idle,
        Err(RecvTimeoutError::Disconnected) => TaskOutcome::QueuePoisoned,
    }
}

/// N OS threads across one or more MPMC task queues (spec.md §4.3 "Two
/// dispatch modes": `Dynamic` is one queue shared by every thread,
/// `MultiQueue` pins `threadsPerQueue` threads to each of `numQueues`
/// queues).
pub struct WorkerPool {
    senders: Vec<MeteredSender<Task>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn start(
        config: &WorkerPoolConfig,
        per_worker_pool_buffers: usize,
        buffer_pool: Arc<BufferPool>,
        metrics: Arc<Metrics>,
        runner: Arc<dyn TaskRunner>,
    ) -> Self {
        let num_queues = config.dispatch_mode.num_queues();
        let total_threads = config.dispatch_mode.total_worker_threads().max(num_queues);
        let threads_per_queue = total_threads / num_queues;
        let poll_timeout = Duration::from_millis(config.worker_poll_timeout_ms.max(1));

        let mut senders = Vec::with_capacity(num_queues);
        let mut handles = Vec::new();
        let mut worker_id = 0usize;

        for queue_index in 0..num_queues {
            let gauge = IntGauge::with_opts(
                Opts::new("nebula_task_queue_depth", "pending tasks in a worker queue")
                    .const_label("queue_index", queue_index.to_string()),
            )
            .expect("static metric opts are always valid");
            let _ = metrics.registry().register(Box::new(gauge.clone()));
            let (tx, rx) = metered_bounded::<Task>(config.task_queue_capacity, gauge);
            senders.push(tx);

            for _ in 0..threads_per_queue {
                let rx = rx.clone();
                let runner = runner.clone();
                let local_pool = buffer_pool.worker_pool(per_worker_pool_buffers);
                let id = worker_id;
                worker_id += 1;
                let handle = thread::Builder::new()
                    .name(format!("nebula-worker-{queue_index}-{id}"))
                    .spawn(move || {
                        let mut worker_ctx = WorkerContext { worker_id: id, local_pool };
                        debug!(worker_id = id, queue_index, "worker thread started");
                        loop {
                            match process_next_task(&rx, &runner, &mut worker_ctx, poll_timeout) {
                                TaskOutcome::Ran => trace!(worker_id = id, "dequeued task"),
                                TaskOutcome::Idle => continue,
                                TaskOutcome::QueuePoisoned => break,
                            }
                        }
                        debug!(worker_id = id, "worker thread stopped");
                    })
                    .expect("failed to spawn worker thread");
                handles.push(handle);
            }
        }

        Self { senders, handles }
    }

    pub fn num_queues(&self) -> usize {
        self.senders.len()
    }

    pub fn submit(&self, queue_index: usize, task: Task) -> Result<(), SendError<Task>> {
        self.senders[queue_index % self.senders.len()].send(task)
    }

    /// A cheap, cloneable handle onto this pool's send side, for a
    /// `TaskRunner` to resubmit follow-on tasks without holding a strong
    /// reference to the pool itself — the pool holds an `Arc<dyn TaskRunner>`,
    /// so the reverse reference would otherwise be a cycle neither side could
    /// tear down.
    pub fn submitter(&self) -> TaskSubmitter {
        TaskSubmitter {
            senders: self.senders.clone(),
        }
    }

    /// Poisons every queue and waits for all worker threads to drain and
    /// exit. This is the pool-wide poison (SPEC_FULL.md §3
    /// "Thread-pool-wide poison vs per-plan stop"), distinct from stopping a
    /// single EQP.
    pub fn shutdown(self) {
        drop(self.senders);
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

#[derive(Clone)]
pub struct TaskSubmitter {
    senders: Vec<MeteredSender<Task>>,
}

impl TaskSubmitter {
    pub fn num_queues(&self) -> usize {
        self.senders.len()
    }

    pub fn submit(&self, queue_index: usize, task: Task) -> Result<(), SendError<Task>> {
        self.senders[queue_index % self.senders.len()].send(task)
    }
}
