// Copyright (c) NebulaStream Contributors
// SPDX-License-Identifier: Apache-2.0

//! Construction-time configuration (spec.md §4.1, §4.3, §4.5).
//!
//! Loading these from YAML/CLI is out of scope (spec.md §1); these structs
//! are the validated, in-memory shape that an external configuration loader
//! is expected to produce.

use serde::{Deserialize, Serialize};

/// Dispatch mode for the worker pool (spec.md §4.3 "Two dispatch modes").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchMode {
    /// A single MPMC task queue shared by all workers.
    Dynamic,
    /// `num_queues` independent MPMC queues, `threads_per_queue` workers
    /// pinned to each, decomposed plans bound round-robin at registration.
    MultiQueue {
        num_queues: usize,
        threads_per_queue: usize,
    },
}

impl DispatchMode {
    pub fn total_worker_threads(&self) -> usize {
        match self {
            DispatchMode::Dynamic => {
                std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
            }
            DispatchMode::MultiQueue {
                num_queues,
                threads_per_queue,
            } => num_queues * threads_per_queue,
        }
    }

    pub fn num_queues(&self) -> usize {
        match self {
            DispatchMode::Dynamic => 1,
            DispatchMode::MultiQueue { num_queues, .. } => *num_queues,
        }
    }
}

/// Tier sizes fixed at construction (spec.md §4.1). Each tier is a count of
/// fixed-size buffers, not a byte budget.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BufferPoolConfig {
    pub buffer_size_bytes: usize,
    pub global_pool_buffers: usize,
    pub per_source_local_pool_buffers: usize,
    pub per_worker_pool_buffers: usize,
    pub acquire_timeout_ms: u64,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            buffer_size_bytes: 4096,
            global_pool_buffers: 1024,
            per_source_local_pool_buffers: 64,
            per_worker_pool_buffers: 16,
            acquire_timeout_ms: 5000,
        }
    }
}

/// Worker pool and task-queue configuration (spec.md §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    pub dispatch_mode: DispatchMode,
    pub task_queue_capacity: usize,
    pub worker_poll_timeout_ms: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            dispatch_mode: DispatchMode::Dynamic,
            task_queue_capacity: 4096,
            worker_poll_timeout_ms: 100,
        }
    }
}

/// Stream-join configuration (spec.md §4.5 "Configuration").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct JoinConfig {
    pub page_size_bytes: usize,
    pub num_partitions: usize,
    pub join_size_in_bytes: usize,
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            page_size_bytes: 64 * 1024,
            num_partitions: 8,
            join_size_in_bytes: 256 * 1024 * 1024,
        }
    }
}
