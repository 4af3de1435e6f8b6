// Copyright (c) NebulaStream Contributors
// SPDX-License-Identifier: Apache-2.0

pub mod marker;
pub mod processor;

pub use marker::{MarkerId, MarkerTracker, ReconfigurationMarker};
pub use processor::WatermarkProcessor;
