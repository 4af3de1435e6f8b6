// Copyright (c) NebulaStream Contributors
// SPDX-License-Identifier: Apache-2.0

//! Operator handlers: per-operator mutable state (spec.md §3 "Join state",
//! §4.4, §4.5, §4.6; §9 "Polymorphism" / "Cyclic ownership").
//!
//! Operators are tagged variants rather than a class hierarchy, exactly as
//! spec.md §9 prescribes, following the teacher's use of `enum_dispatch` for
//! `Block::V1`/`BlockAPI` (`src/block.rs`). Handlers are allocated once in
//! an arena owned by the `ExecutableQueryPlan` and live exactly as long as
//! it does; pipelines address them by index rather than holding an owning
//! reference, which is how the spec avoids parent/child reference cycles.

use enum_dispatch::enum_dispatch;

use crate::join::join_state::JoinOperatorHandler;
use crate::watermark::processor::WatermarkProcessor;
use crate::windowing::window_handler::WindowOperatorHandler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorHandlerKind {
    Window,
    Join,
    Watermark,
}

#[enum_dispatch]
pub trait OperatorHandlerApi {
    fn handler_kind(&self) -> OperatorHandlerKind;
}

#[enum_dispatch(OperatorHandlerApi)]
pub enum OperatorHandler {
    Window(WindowOperatorHandler),
    Join(JoinOperatorHandler),
    Watermark(WatermarkProcessor),
}

impl OperatorHandler {
    pub fn as_window(&self) -> Option<&WindowOperatorHandler> {
        match self {
            OperatorHandler::Window(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_join(&self) -> Option<&JoinOperatorHandler> {
        match self {
            OperatorHandler::Join(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_watermark(&self) -> Option<&WatermarkProcessor> {
        match self {
            OperatorHandler::Watermark(h) => Some(h),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperatorHandlerId(pub usize);

/// Owns every operator handler for one `ExecutableQueryPlan`. Handlers
/// themselves provide their own interior synchronization (striped locks for
/// slice stores, thread-local build tables for joins), so the arena only
/// needs to hand out shared references.
pub struct OperatorHandlerArena {
    handlers: Vec<OperatorHandler>,
}

impl OperatorHandlerArena {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    pub fn push(&mut self, handler: OperatorHandler) -> OperatorHandlerId {
        let id = OperatorHandlerId(self.handlers.len());
        self.handlers.push(handler);
        id
    }

    pub fn get(&self, id: OperatorHandlerId) -> &OperatorHandler {
        &self.handlers[id.0]
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for OperatorHandlerArena {
    fn default() -> Self {
        Self::new()
    }
}
