// Copyright (c) NebulaStream Contributors
// SPDX-License-Identifier: Apache-2.0

//! Tiered buffer pool (spec.md §4.1).
//!
//! Each tier is a bounded `crossbeam_channel` pre-filled with
//! `Vec<u8>` segments at construction. A channel gives us the two
//! operations the spec needs for free: `recv()` blocks until a segment is
//! available (`acquire`), and `try_recv()`/`recv_timeout()` give the
//! non-blocking and timed variants (`tryAcquire`, the backpressure path).
//! Lock-freedom is inherited from `crossbeam_channel`'s internal queue,
//! matching spec.md §5's "lock-free free list" requirement without hand
//! rolling one.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{debug, warn};

use crate::buffer::tuple_buffer::TupleBufferBuilder;
use crate::config::BufferPoolConfig;
use crate::error::{ExecutionError, ExecutionResult};
use crate::metrics::Metrics;
use crate::pipeline::plan::DecomposedQueryId;

/// Which tier a segment was drawn from (spec.md §4.1: "global pool... local
/// pools... per-worker pools").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Global,
    Local,
    Worker,
}

struct TierPool {
    tier: Tier,
    buffer_size_bytes: usize,
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

impl TierPool {
    fn new(tier: Tier, capacity: usize, buffer_size_bytes: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        for _ in 0..capacity {
            tx.send(vec![0u8; buffer_size_bytes]).expect("pool just created, cannot be full");
        }
        Self {
            tier,
            buffer_size_bytes,
            tx,
            rx,
        }
    }

    fn free_count(&self) -> usize {
        self.rx.len()
    }
}

/// Pooled memory substrate shared by every operator (spec.md §4.1).
pub struct BufferPool {
    global: TierPool,
    metrics: Arc<Metrics>,
    acquire_timeout: Duration,
}

impl BufferPool {
    pub fn new(config: BufferPoolConfig, metrics: Arc<Metrics>) -> Arc<Self> {
        let global = TierPool::new(Tier::Global, config.global_pool_buffers, config.buffer_size_bytes);
        metrics.buffer_pool_free.set(global.free_count() as i64);
        Arc::new(Self {
            global,
            metrics,
            acquire_timeout: Duration::from_millis(config.acquire_timeout_ms),
        })
    }

    /// A pool scoped to a single source for burst absorption (spec.md §4.1
    /// "per-source local pools").
    pub fn local_pool(&self, capacity: usize) -> LocalBufferPool {
        LocalBufferPool {
            tier: TierPool::new(Tier::Local, capacity, self.global.buffer_size_bytes),
            metrics: self.metrics.clone(),
        }
    }

    /// A pool scoped to a single worker thread for per-task scratch (spec.md
    /// §4.1 "per-worker pools").
    pub fn worker_pool(&self, capacity: usize) -> LocalBufferPool {
        LocalBufferPool {
            tier: TierPool::new(Tier::Worker, capacity, self.global.buffer_size_bytes),
            metrics: self.metrics.clone(),
        }
    }

    /// Blocks until a buffer is available from the global tier.
    pub fn acquire(&self) -> TupleBufferBuilder {
        let segment = self.global.rx.recv().expect("buffer pool sender outlives the pool");
        self.metrics.buffer_pool_free.dec();
        self.metrics.buffer_pool_acquired_total.inc();
        TupleBufferBuilder::new(segment, self.release_fn(Tier::Global, self.global.tx.clone()))
    }

    /// Non-blocking acquire; returns `None` immediately if the tier is
    /// exhausted (spec.md §4.1 "callers that must not block use
    /// `tryAcquire`").
    pub fn try_acquire(&self) -> Option<TupleBufferBuilder> {
        match self.global.rx.try_recv() {
            Ok(segment) => {
                self.metrics.buffer_pool_free.dec();
                self.metrics.buffer_pool_acquired_total.inc();
                Some(TupleBufferBuilder::new(
                    segment,
                    self.release_fn(Tier::Global, self.global.tx.clone()),
                ))
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Acquires with a bounded wait; on timeout the caller (typically a
    /// source) must apply backpressure rather than drop data (spec.md §4.1
    /// "Failure").
    pub fn acquire_with_backpressure(
        &self,
        decomposed_query_id: DecomposedQueryId,
    ) -> ExecutionResult<TupleBufferBuilder> {
        match self.global.rx.recv_timeout(self.acquire_timeout) {
            Ok(segment) => {
                self.metrics.buffer_pool_free.dec();
                self.metrics.buffer_pool_acquired_total.inc();
                Ok(TupleBufferBuilder::new(
                    segment,
                    self.release_fn(Tier::Global, self.global.tx.clone()),
                ))
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    ?decomposed_query_id,
                    "buffer pool exhausted, applying backpressure"
                );
                Err(ExecutionError::ResourceExhausted {
                    decomposed_query_id,
                    reason: "global buffer pool exhausted".to_string(),
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(ExecutionError::Poisoned),
        }
    }

    /// Allocates an unpooled, oversized buffer not backed by any tier
    /// (spec.md §4.1 `acquireUnpooled`). Its segment is deallocated normally
    /// on last release rather than returned to a free list.
    pub fn acquire_unpooled(&self, size_bytes: usize) -> TupleBufferBuilder {
        debug!(size_bytes, "allocating unpooled buffer");
        TupleBufferBuilder::new_unpooled(vec![0u8; size_bytes])
    }

    /// Sum of free buffers across the global tier. Used by the "buffer
    /// accounting" testable property (spec.md §8): at quiescence this must
    /// equal the tier's initial capacity.
    pub fn free_count(&self) -> usize {
        self.global.free_count()
    }

    pub fn buffer_size_bytes(&self) -> usize {
        self.global.buffer_size_bytes
    }

    fn release_fn(&self, tier: Tier, tx: Sender<Vec<u8>>) -> impl Fn(Vec<u8>) + Send + Sync + 'static {
        let metrics = self.metrics.clone();
        move |segment: Vec<u8>| {
            if tx.try_send(segment).is_ok() {
                metrics.buffer_pool_free.inc();
            }
            let _ = tier;
        }
    }
}

/// A tier scoped below the global pool (local or worker). Shares the same
/// release-on-drop semantics as the global tier.
pub struct LocalBufferPool {
    tier: TierPool,
    metrics: Arc<Metrics>,
}

impl LocalBufferPool {
    pub fn acquire(&self) -> TupleBufferBuilder {
        let segment = self.tier.rx.recv().expect("local pool sender outlives the pool");
        let tx = self.tier.tx.clone();
        let metrics = self.metrics.clone();
        TupleBufferBuilder::new(
            segment,
            move |segment| {
                let _ = tx.try_send(segment);
                let _ = &metrics;
            },
        )
    }

    pub fn try_acquire(&self) -> Option<TupleBufferBuilder> {
        let segment = self.tier.rx.try_recv().ok()?;
        let tx = self.tier.tx.clone();
        Some(TupleBufferBuilder::new(segment, move |segment| {
            let _ = tx.try_send(segment);
        }))
    }

    pub fn free_count(&self) -> usize {
        self.tier.free_count()
    }

    pub fn tier(&self) -> Tier {
        self.tier.tier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pool() -> Arc<BufferPool> {
        BufferPool::new(
            BufferPoolConfig {
                buffer_size_bytes: 64,
                global_pool_buffers: 4,
                per_source_local_pool_buffers: 2,
                per_worker_pool_buffers: 2,
                acquire_timeout_ms: 50,
            },
            Metrics::new_for_test(),
        )
    }

    #[test]
    fn acquire_and_release_returns_to_free_list() {
        let pool = test_pool();
        assert_eq!(pool.free_count(), 4);
        let buf = pool.acquire();
        assert_eq!(pool.free_count(), 3);
        drop(buf.finish(0, 0, 0));
        assert_eq!(pool.free_count(), 4);
    }

    #[test]
    fn exhaustion_triggers_backpressure_error() {
        let pool = test_pool();
        let _held: Vec<_> = (0..4).map(|_| pool.acquire()).collect();
        assert!(pool.try_acquire().is_none());
        let err = pool.acquire_with_backpressure(DecomposedQueryId::new_for_test(1));
        assert!(matches!(err, Err(ExecutionError::ResourceExhausted { .. })));
    }

    #[test]
    fn child_buffer_keeps_segment_alive_until_both_drop() {
        let pool = test_pool();
        let mut builder = pool.acquire();
        builder.write_row(b"hello row..........");
        let buffer = builder.finish(1, 1, 0);
        let child = buffer.slice(0..buffer.len());
        assert_eq!(pool.free_count(), 3);
        drop(buffer);
        assert_eq!(pool.free_count(), 3, "child still holds the segment");
        drop(child);
        assert_eq!(pool.free_count(), 4);
    }
}
