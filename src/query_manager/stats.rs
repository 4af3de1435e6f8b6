// Copyright (c) NebulaStream Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-task statistics bookkeeping tying the worker loop into
//! `metrics::QueryStatistics` (spec.md §6.6 "Statistics surface").

use std::time::Instant;

use crate::metrics::QueryStatistics;

pub struct TaskTimer {
    started: Instant,
}

impl TaskTimer {
    pub fn start() -> Self {
        Self { started: Instant::now() }
    }

    pub fn record(self, stats: &QueryStatistics) {
        stats.task_latency_seconds.observe(self.started.elapsed().as_secs_f64());
    }
}

pub fn record_success(stats: &QueryStatistics, tuple_count: usize) {
    stats.processed_tasks.inc();
    stats.processed_buffers.inc();
    stats.processed_tuples.inc_by(tuple_count as u64);
}

pub fn record_failure(stats: &QueryStatistics) {
    stats.error_count.inc();
}
