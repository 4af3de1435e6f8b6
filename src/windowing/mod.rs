// Copyright (c) NebulaStream Contributors
// SPDX-License-Identifier: Apache-2.0

pub mod aggregation;
pub mod slice;
pub mod slice_store;
pub mod window;
pub mod window_handler;

pub use aggregation::{
    Aggregation, AggregateValue, AggregationKind, AvgAggregation, AvgPartial, CountAggregation,
    DynamicAggregation, MaxAggregation, MinAggregation, SumAggregation,
};
pub use slice::{Slice, SliceAssigner};
pub use slice_store::SliceStore;
pub use window::Window;
pub use window_handler::{GroupKey, WindowOperatorHandler};
