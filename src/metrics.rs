// Copyright (c) NebulaStream Contributors
// SPDX-License-Identifier: Apache-2.0

//! Process-wide statistics registry (spec.md §6.6, §9 "Global state").
//!
//! Mirrors the shape of `mysten_metrics`: counters and gauges are registered
//! once against a `prometheus::Registry` and handed out as cheap `Arc`-backed
//! handles. Per-decomposed-query metrics are created lazily on
//! `QueryManager::register_executable_query_plan` and reset only when that
//! decomposed query id is re-registered (spec.md §6.6), never implicitly.

use std::sync::Arc;

use dashmap::DashMap;
use prometheus::{
    exponential_buckets, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry,
};

use crate::pipeline::plan::DecomposedQueryId;

/// Counters and gauges scoped to a single decomposed query plan.
pub struct QueryStatistics {
    pub processed_buffers: IntCounter,
    pub processed_tasks: IntCounter,
    pub processed_tuples: IntCounter,
    pub error_count: IntCounter,
    pub queue_depth: IntGauge,
    pub task_latency_seconds: Histogram,
}

impl QueryStatistics {
    fn new(registry: &Registry, decomposed_query_id: DecomposedQueryId) -> Self {
        let label = decomposed_query_id.to_string();
        let mk_counter = |name: &str, help: &str| {
            let counter = IntCounter::with_opts(
                Opts::new(name, help).const_label("decomposed_query_id", label.clone()),
            )
            .unwrap();
            // Registration can race during tests that construct/drop registries
            // repeatedly; duplicate registration is not a correctness issue here.
            let _ = registry.register(Box::new(counter.clone()));
            counter
        };
        let mk_gauge = |name: &str, help: &str| {
            let gauge = IntGauge::with_opts(
                Opts::new(name, help).const_label("decomposed_query_id", label.clone()),
            )
            .unwrap();
            let _ = registry.register(Box::new(gauge.clone()));
            gauge
        };
        let task_latency_seconds = Histogram::with_opts(
            HistogramOpts::new("nebula_task_latency_seconds", "per-task execution latency")
                .const_label("decomposed_query_id", label.clone())
                .buckets(exponential_buckets(1e-6, 4.0, 16).unwrap()),
        )
        .unwrap();
        let _ = registry.register(Box::new(task_latency_seconds.clone()));

        Self {
            processed_buffers: mk_counter("nebula_processed_buffers", "buffers processed"),
            processed_tasks: mk_counter("nebula_processed_tasks", "tasks processed"),
            processed_tuples: mk_counter("nebula_processed_tuples", "tuples processed"),
            error_count: mk_counter("nebula_error_count", "task errors observed"),
            queue_depth: mk_gauge("nebula_queue_depth", "pending tasks for this plan"),
            task_latency_seconds,
        }
    }
}

/// Process-wide metrics registry, constructed once at process start and torn
/// down after all executable query plans are `Finished` or `Stopped`
/// (spec.md §9 "Global state").
pub struct Metrics {
    registry: Registry,
    per_query: DashMap<DecomposedQueryId, Arc<QueryStatistics>>,
    pub buffer_pool_free: IntGauge,
    pub buffer_pool_acquired_total: IntCounter,
}

impl Metrics {
    pub fn new(registry: Registry) -> Arc<Self> {
        let buffer_pool_free = IntGauge::with_opts(Opts::new(
            "nebula_buffer_pool_free",
            "free tuple buffers across all tiers",
        ))
        .unwrap();
        let _ = registry.register(Box::new(buffer_pool_free.clone()));

        let buffer_pool_acquired_total = IntCounter::with_opts(Opts::new(
            "nebula_buffer_pool_acquired_total",
            "total buffer acquisitions",
        ))
        .unwrap();
        let _ = registry.register(Box::new(buffer_pool_acquired_total.clone()));

        Arc::new(Self {
            registry,
            per_query: DashMap::new(),
            buffer_pool_free,
            buffer_pool_acquired_total,
        })
    }

    #[cfg(test)]
    pub fn new_for_test() -> Arc<Self> {
        Self::new(Registry::new())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Allocates fresh statistics for a decomposed query, replacing any
    /// counters left over from a previous registration under the same id.
    pub fn statistics_for(&self, decomposed_query_id: DecomposedQueryId) -> Arc<QueryStatistics> {
        let stats = Arc::new(QueryStatistics::new(&self.registry, decomposed_query_id));
        self.per_query.insert(decomposed_query_id, stats.clone());
        stats
    }

    pub fn existing_statistics(
        &self,
        decomposed_query_id: DecomposedQueryId,
    ) -> Option<Arc<QueryStatistics>> {
        self.per_query
            .get(&decomposed_query_id)
            .map(|entry| entry.clone())
    }

    pub fn remove_statistics(&self, decomposed_query_id: DecomposedQueryId) {
        self.per_query.remove(&decomposed_query_id);
    }
}
