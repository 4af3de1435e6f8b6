// Copyright (c) NebulaStream Contributors
// SPDX-License-Identifier: Apache-2.0

//! `VariableSizedData`: per-task arena allocation for variable-length
//! payloads such as strings and blobs (spec.md §3).
//!
//! Lifetime is bounded by the task that allocated it unless the caller
//! explicitly copies the bytes out (e.g. into a slice store's partial). We
//! model that with a plain bump arena owned by the `PipelineContext` for one
//! task invocation; nothing here outlives the arena's owner.

use bytes::Bytes;

pub struct VariableSizedDataArena {
    chunks: Vec<Vec<u8>>,
}

impl VariableSizedDataArena {
    pub fn new() -> Self {
        Self { chunks: Vec::new() }
    }

    /// Copies `data` into the arena and returns a handle valid for the
    /// lifetime of this arena.
    pub fn allocate(&mut self, data: &[u8]) -> VariableSizedData {
        let index = self.chunks.len();
        self.chunks.push(data.to_vec());
        VariableSizedData {
            arena_index: index,
            len: data.len(),
        }
    }

    pub fn resolve(&self, handle: &VariableSizedData) -> &[u8] {
        &self.chunks[handle.arena_index]
    }

    /// Copies a handle's bytes out of the arena into an independently owned,
    /// refcounted `Bytes`, outliving the arena (spec.md §3: "unless
    /// explicitly copied out").
    pub fn copy_out(&self, handle: &VariableSizedData) -> Bytes {
        Bytes::copy_from_slice(self.resolve(handle))
    }

    pub fn reset(&mut self) {
        self.chunks.clear();
    }
}

impl Default for VariableSizedDataArena {
    fn default() -> Self {
        Self::new()
    }
}

/// A handle into a `VariableSizedDataArena`. Not `Send`/`Sync` across task
/// boundaries by convention: it is only meaningful alongside the arena that
/// produced it.
#[derive(Debug, Clone, Copy)]
pub struct VariableSizedData {
    arena_index: usize,
    len: usize,
}

impl VariableSizedData {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_and_resolve_round_trips() {
        let mut arena = VariableSizedDataArena::new();
        let handle = arena.allocate(b"hello world");
        assert_eq!(arena.resolve(&handle), b"hello world");
        assert_eq!(handle.len(), 11);
    }

    #[test]
    fn copy_out_survives_reset() {
        let mut arena = VariableSizedDataArena::new();
        let handle = arena.allocate(b"payload");
        let copied = arena.copy_out(&handle);
        arena.reset();
        assert_eq!(&copied[..], b"payload");
    }
}
