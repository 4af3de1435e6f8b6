// Copyright (c) NebulaStream Contributors
// SPDX-License-Identifier: Apache-2.0

pub mod hash_table;
pub mod join_state;

pub use hash_table::{hash_key, Bucket, PartitionedTable};
pub use join_state::{JoinOperatorHandler, JoinRecordLayout, JoinSide, JoinedRecord};
