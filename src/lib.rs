// Copyright (c) NebulaStream Contributors
// SPDX-License-Identifier: Apache-2.0

//! Query execution core for a NebulaStream worker node: tiered buffer
//! management, a worker thread pool dispatching compiled pipeline stages,
//! windowing (tumbling/sliding slice-and-trigger aggregation) and
//! stream-join state, and watermark / reconfiguration-marker propagation
//! (spec.md §1 "Overview").
//!
//! Sources, sinks, the query optimizer, the Nautilus pipeline compiler, and
//! network transport are all out of scope (spec.md §1 "Non-goals"); this
//! crate is the runtime that an already-compiled, already-placed executable
//! query plan runs on.

pub mod buffer;
pub mod config;
pub mod context;
pub mod error;
pub mod join;
pub mod metered_queue;
pub mod metrics;
pub mod pipeline;
pub mod query_manager;
pub mod source_sink;
pub mod watermark;
pub mod windowing;

pub use config::{BufferPoolConfig, DispatchMode, JoinConfig, WorkerPoolConfig};
pub use context::ExecutionContext;
pub use error::{ExecutionError, ExecutionResult};
pub use query_manager::{QueryManager, QueryManagerStatus};
