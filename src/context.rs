// Copyright (c) NebulaStream Contributors
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use prometheus::Registry;

use crate::config::{BufferPoolConfig, JoinConfig, WorkerPoolConfig};
use crate::metrics::Metrics;

/// Configuration and metrics shared by every component of a worker node's
/// execution core, analogous to the teacher's per-epoch `Context` but scoped
/// to the lifetime of the whole process rather than a single epoch: this
/// crate has no notion of epochs, and spec.md §9 "Global state" describes
/// exactly this pairing — a statistics registry and a buffer-pool factory,
/// both initialized at process start and torn down after every EQP is
/// `Finished` or `Stopped`.
#[derive(Clone)]
pub struct ExecutionContext {
    pub buffer_pool_config: BufferPoolConfig,
    pub worker_pool_config: WorkerPoolConfig,
    pub join_config: JoinConfig,
    pub metrics: Arc<Metrics>,
}

impl ExecutionContext {
    pub fn new(
        buffer_pool_config: BufferPoolConfig,
        worker_pool_config: WorkerPoolConfig,
        join_config: JoinConfig,
    ) -> Self {
        Self {
            buffer_pool_config,
            worker_pool_config,
            join_config,
            metrics: Metrics::new(Registry::new()),
        }
    }

    #[cfg(test)]
    pub fn new_for_test() -> Self {
        Self {
            buffer_pool_config: BufferPoolConfig {
                buffer_size_bytes: 256,
                global_pool_buffers: 16,
                per_source_local_pool_buffers: 4,
                per_worker_pool_buffers: 2,
                acquire_timeout_ms: 200,
            },
            worker_pool_config: WorkerPoolConfig {
                dispatch_mode: crate::config::DispatchMode::Dynamic,
                task_queue_capacity: 64,
                worker_poll_timeout_ms: 20,
            },
            join_config: JoinConfig::default(),
            metrics: Metrics::new_for_test(),
        }
    }

    #[cfg(test)]
    pub fn with_worker_pool_config(mut self, worker_pool_config: WorkerPoolConfig) -> Self {
        self.worker_pool_config = worker_pool_config;
        self
    }

    #[cfg(test)]
    pub fn with_join_config(mut self, join_config: JoinConfig) -> Self {
        self.join_config = join_config;
        self
    }
}
