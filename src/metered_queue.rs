// Copyright (c) NebulaStream Contributors
// SPDX-License-Identifier: Apache-2.0

//! A bounded MPMC queue with blocking pop, instrumented with an `IntGauge`
//! queue-depth metric.
//!
//! This is the synchronous-thread analogue of `mysten_metrics::metered_channel`,
//! which wraps `tokio::sync::mpsc` for async callers. The query manager's
//! worker pool (spec.md §5 "Scheduling model") runs on OS threads and must
//! block on an empty queue rather than `.await`, so we wrap
//! `crossbeam_channel` instead, keeping the same "gauge tracks live depth"
//! idiom.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use prometheus::IntGauge;

pub fn metered_bounded<T>(capacity: usize, depth_gauge: IntGauge) -> (MeteredSender<T>, MeteredReceiver<T>) {
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    (
        MeteredSender {
            inner: tx,
            depth_gauge: depth_gauge.clone(),
        },
        MeteredReceiver {
            inner: rx,
            depth_gauge,
        },
    )
}

#[derive(Clone)]
pub struct MeteredSender<T> {
    inner: Sender<T>,
    depth_gauge: IntGauge,
}

impl<T> MeteredSender<T> {
    pub fn send(&self, item: T) -> Result<(), crossbeam_channel::SendError<T>> {
        self.inner.send(item)?;
        self.depth_gauge.inc();
        Ok(())
    }

    pub fn try_send(&self, item: T) -> Result<(), TrySendError<T>> {
        self.inner.try_send(item)?;
        self.depth_gauge.inc();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

pub struct MeteredReceiver<T> {
    inner: Receiver<T>,
    depth_gauge: IntGauge,
}

impl<T> Clone for MeteredReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            depth_gauge: self.depth_gauge.clone(),
        }
    }
}

impl<T> MeteredReceiver<T> {
    /// Blocks until an item is available or the queue is poisoned (every
    /// sender dropped).
    pub fn recv(&self) -> Option<T> {
        let item = self.inner.recv().ok();
        if item.is_some() {
            self.depth_gauge.dec();
        }
        item
    }

    /// Bounded wait, used by the worker loop so a thread can periodically
    /// check for cooperative shutdown without busy-spinning (spec.md §5
    /// "Worker blocks on empty task queue").
    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        let item = self.inner.recv_timeout(timeout)?;
        self.depth_gauge.dec();
        Ok(item)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_tracks_send_and_recv() {
        let gauge = IntGauge::new("test_depth", "test").unwrap();
        let (tx, rx) = metered_bounded::<i32>(4, gauge.clone());
        assert_eq!(gauge.get(), 0);
        tx.send(1).unwrap();
        tx.send(2).unwrap();
        assert_eq!(gauge.get(), 2);
        assert_eq!(rx.recv(), Some(1));
        assert_eq!(gauge.get(), 1);
        assert_eq!(rx.recv(), Some(2));
        assert_eq!(gauge.get(), 0);
    }

    #[test]
    fn poison_wakes_receiver() {
        let gauge = IntGauge::new("test_depth2", "test").unwrap();
        let (tx, rx) = metered_bounded::<i32>(1, gauge);
        drop(tx);
        assert_eq!(rx.recv(), None);
    }
}
