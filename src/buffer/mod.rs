// Copyright (c) NebulaStream Contributors
// SPDX-License-Identifier: Apache-2.0

pub mod arena;
pub mod pool;
pub mod schema;
pub mod tuple_buffer;

pub use arena::{VariableSizedData, VariableSizedDataArena};
pub use pool::{BufferPool, LocalBufferPool, Tier};
pub use schema::{Field, Layout, PhysicalType, Schema};
pub use tuple_buffer::{OriginId, SequenceNumber, Timestamp, TupleBuffer, TupleBufferBuilder};
