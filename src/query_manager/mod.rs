// Copyright (c) NebulaStream Contributors
// SPDX-License-Identifier: Apache-2.0

pub mod manager;
pub mod reconfiguration;
pub mod stats;
pub mod task;
pub mod worker_pool;

pub use manager::{QueryManager, QueryManagerStatus};
pub use reconfiguration::{ReconfigurationMessage, StopKind};
pub use task::Task;
pub use worker_pool::{TaskRunner, TaskSubmitter, WorkerPool};
